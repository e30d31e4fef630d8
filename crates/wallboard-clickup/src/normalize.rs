//! Raw ClickUp task → canonical [`Task`]
//!
//! `normalize` is pure and total: any JSON object produces a Task, with
//! missing or odd sub-fields falling back to the defaults below.

use crate::fields::{parse_date_value, resolve_deadline, resolve_project, resolve_tags, FieldSelectors};
use crate::models::{
    Assignee, Priority, RawAssignee, RawId, RawPriority, RawStatus, RawTask, StatusKind, Task,
    TaskStatus,
};

/// Status texts/categories that mean the task is finished
pub const CLOSED_STATUS_VALUES: [&str; 5] = ["closed", "done", "completed", "complete", "resolved"];

pub const UNKNOWN_STATUS_LABEL: &str = "Unknown";
pub const NO_PRIORITY_LABEL: &str = "None";
/// Id used for records carrying neither `custom_id` nor `id`
pub const MISSING_TASK_ID: &str = "unknown";

pub fn normalize(raw: &RawTask, selectors: &FieldSelectors) -> Task {
    Task {
        id: task_id(raw),
        name: raw.name.clone().unwrap_or_default(),
        status: normalize_status(raw.status.as_ref()),
        assignees: raw.assignees.iter().filter_map(normalize_assignee).collect(),
        due_date: raw.due_date.as_ref().and_then(parse_date_value),
        priority: normalize_priority(raw.priority.as_ref()),
        tags: resolve_tags(&raw.custom_fields, selectors),
        project_name: resolve_project(&raw.custom_fields, selectors),
        deadline: resolve_deadline(&raw.custom_fields, selectors),
        external_url: non_empty(raw.url.as_deref()),
    }
}

pub fn normalize_all(raw_tasks: &[RawTask], selectors: &FieldSelectors) -> Vec<Task> {
    raw_tasks
        .iter()
        .map(|raw| normalize(raw, selectors))
        .collect()
}

fn task_id(raw: &RawTask) -> String {
    non_empty(raw.custom_id.as_deref())
        .or_else(|| raw.id.as_ref().and_then(RawId::to_text))
        .unwrap_or_else(|| MISSING_TASK_ID.to_string())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn normalize_status(status: Option<&RawStatus>) -> TaskStatus {
    let text = status.and_then(|status| non_empty(status.status.as_deref()));
    let raw_category = status.and_then(|status| non_empty(status.status_type.as_deref()));

    let category = raw_category.as_deref().map(|category| {
        let lowered = category.to_lowercase();
        if lowered == "done" {
            "closed".to_string()
        } else {
            lowered
        }
    });

    let is_closed = text
        .as_deref()
        .map(|text| is_closed_value(&text.to_lowercase()))
        .unwrap_or(false)
        || category.as_deref().map(is_closed_value).unwrap_or(false);

    TaskStatus {
        label: text
            .or(raw_category)
            .unwrap_or_else(|| UNKNOWN_STATUS_LABEL.to_string()),
        color: status.and_then(|status| non_empty(status.color.as_deref())),
        category,
        kind: if is_closed {
            StatusKind::Closed
        } else {
            StatusKind::Open
        },
    }
}

fn is_closed_value(value: &str) -> bool {
    CLOSED_STATUS_VALUES.contains(&value)
}

/// Username, then email, then the raw id. Entries with none of these are skipped.
fn normalize_assignee(raw: &RawAssignee) -> Option<Assignee> {
    let name = non_empty(raw.username.as_deref())
        .or_else(|| non_empty(raw.email.as_deref()))
        .or_else(|| raw.id.as_ref().and_then(RawId::to_text))?;

    Some(Assignee {
        name,
        avatar_url: non_empty(raw.profile_picture.as_deref())
            .or_else(|| non_empty(raw.avatar.as_deref())),
    })
}

fn normalize_priority(priority: Option<&RawPriority>) -> Priority {
    let (label, color) = match priority {
        Some(RawPriority::Detailed { priority, color }) => (
            non_empty(priority.as_deref()),
            non_empty(color.as_deref()),
        ),
        Some(RawPriority::Label(label)) => (non_empty(Some(label.as_str())), None),
        None => (None, None),
    };

    Priority {
        label: label.unwrap_or_else(|| NO_PRIORITY_LABEL.to_string()),
        color,
    }
}
