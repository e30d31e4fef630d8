use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Deserialize a field, treating wrong-typed values as absent.
///
/// ClickUp payloads are not consistent across workspaces and API versions, and
/// one odd field must never make a whole task (or page) unreadable.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Deserialize a list, dropping elements that don't fit and treating a
/// non-list as empty.
fn lenient_vec<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Identifier that ClickUp sends either as a string or as a number
/// (assignee ids are numeric, task ids are strings)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    /// Textual form, `None` for an empty string
    pub fn to_text(&self) -> Option<String> {
        match self {
            RawId::Text(text) if text.trim().is_empty() => None,
            RawId::Text(text) => Some(text.clone()),
            RawId::Number(number) => Some(number.to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawId::Text(text) => text.trim().parse().ok(),
            RawId::Number(number) => number.as_i64(),
        }
    }
}

/// A date as found in `due_date` or in a date-typed custom field value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DateValue {
    /// Epoch milliseconds
    Number(serde_json::Number),
    /// Epoch milliseconds as a string, or an ISO 8601 date / date-time
    Text(String),
    /// Object wrapping the actual date under `start`, `date`, `end`, ...
    Nested(serde_json::Map<String, Value>),
}

/// Task record as returned by `GET /list/{list_id}/task`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTask {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<RawId>,
    #[serde(default, deserialize_with = "lenient")]
    pub custom_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<RawStatus>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub assignees: Vec<RawAssignee>,
    #[serde(default, deserialize_with = "lenient")]
    pub due_date: Option<DateValue>,
    #[serde(default, deserialize_with = "lenient")]
    pub priority: Option<RawPriority>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub custom_fields: Vec<RawCustomField>,
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
}

impl RawTask {
    /// Read a task from arbitrary JSON. Anything that isn't an object becomes
    /// an empty record.
    pub fn from_json(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStatus {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    /// Status category: `open`, `custom`, `closed`, `done`
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub status_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAssignee {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<RawId>,
    #[serde(default, deserialize_with = "lenient")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub email: Option<String>,
    #[serde(rename = "profilePicture", default, deserialize_with = "lenient")]
    pub profile_picture: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPriority {
    Detailed {
        #[serde(default, deserialize_with = "lenient")]
        priority: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        color: Option<String>,
    },
    Label(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCustomField {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub label: Option<String>,
    /// Declared field type: `labels`, `drop_down`, `list_relationship`, `date`, ...
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub field_type: Option<String>,
    /// Shape depends on `field_type`; interpreted by the field resolver
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub type_config: Option<RawTypeConfig>,
}

impl RawCustomField {
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.label.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTypeConfig {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub options: Vec<RawFieldOption>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFieldOption {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub color: Option<String>,
    /// Position of the option; drop-down values reference options by it
    #[serde(default, deserialize_with = "lenient")]
    pub orderindex: Option<RawId>,
}

/// One page of the list task endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPage {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub tasks: Vec<RawTask>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_page: Option<bool>,
}

impl TaskPage {
    pub fn is_last_page(&self) -> bool {
        self.last_page.unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Canonical model
// ---------------------------------------------------------------------------

/// Display-ready task produced by the normalizer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    /// `custom_id` when set, otherwise the internal id
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub assignees: Vec<Assignee>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    /// From the tags custom field, in source order
    pub tags: Vec<Tag>,
    pub project_name: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub external_url: Option<String>,
}

impl Task {
    pub fn is_closed(&self) -> bool {
        self.status.kind == StatusKind::Closed
    }

    pub fn primary_assignee_name(&self) -> Option<&str> {
        self.assignees.first().map(|assignee| assignee.name.as_str())
    }

    /// All assignee names joined with `", "`, as shown on the workload board
    pub fn assignee_display(&self) -> Option<String> {
        if self.assignees.is_empty() {
            return None;
        }
        Some(
            self.assignees
                .iter()
                .map(|assignee| assignee.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatus {
    pub label: String,
    pub color: Option<String>,
    /// Lowercased status type with `done` folded into `closed`
    pub category: Option<String>,
    pub kind: StatusKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignee {
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Priority {
    pub label: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub color: Option<String>,
}
