//! Custom field resolution
//!
//! The organization models tags, project and deadline as ClickUp custom
//! fields. A deployment can pin each field by id; without an id the field is
//! discovered by type and a normalized name match.
//!
//! Every resolver here is total: missing fields, unexpected value shapes and
//! unknown option ids resolve to empty/absent data, never to an error.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::models::{DateValue, RawCustomField, RawFieldOption, RawId, Tag};

/// Keys of a nested date object, in the order they are consulted
const NESTED_DATE_KEYS: [&str; 6] = ["start", "date", "value", "end", "due", "time"];

const MAX_DATE_DEPTH: usize = 4;

/// How to locate one custom field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    /// Exact field id; wins over any heuristic match
    pub preferred_id: Option<String>,
    /// Substring the normalized field name must contain
    pub name_contains: Option<String>,
    /// Declared field type, compared case-insensitively
    pub field_type: Option<String>,
}

impl FieldSelector {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            preferred_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_name(name_contains: impl Into<String>) -> Self {
        Self {
            name_contains: Some(name_contains.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, field_type: impl Into<String>) -> Self {
        self.field_type = Some(field_type.into());
        self
    }

    fn matches_heuristically(&self, field: &RawCustomField) -> bool {
        if self.name_contains.is_none() && self.field_type.is_none() {
            return false;
        }

        if let Some(expected) = &self.field_type {
            let declared = field.field_type.as_deref().unwrap_or_default();
            if !declared.eq_ignore_ascii_case(expected) {
                return false;
            }
        }

        if let Some(needle) = &self.name_contains {
            let needle = normalize_field_name(needle);
            let name = field.display_name().map(normalize_field_name);
            return match name {
                Some(name) => !needle.is_empty() && name.contains(&needle),
                None => false,
            };
        }

        true
    }
}

/// Optional per-deployment field id overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelectors {
    pub tags_field_id: Option<String>,
    pub project_field_id: Option<String>,
    pub deadline_field_id: Option<String>,
}

impl FieldSelectors {
    fn tags(&self) -> Vec<FieldSelector> {
        let mut selectors = pinned(&self.tags_field_id);
        selectors.push(FieldSelector::by_name("tags"));
        selectors.push(FieldSelector::by_name("tag").with_type("labels"));
        selectors
    }

    fn project(&self) -> Vec<FieldSelector> {
        let mut selectors = pinned(&self.project_field_id);
        selectors.push(FieldSelector::by_name("project").with_type("list_relationship"));
        selectors.push(FieldSelector::by_name("project").with_type("tasks"));
        selectors.push(FieldSelector::by_name("project").with_type("drop_down"));
        selectors
    }

    fn deadline(&self) -> Vec<FieldSelector> {
        let mut selectors = pinned(&self.deadline_field_id);
        selectors.push(FieldSelector::by_name("deadline").with_type("date"));
        selectors
    }
}

fn pinned(id: &Option<String>) -> Vec<FieldSelector> {
    id.iter().map(FieldSelector::by_id).collect()
}

/// Lowercase alphanumeric tokens separated by single spaces.
///
/// Applies NFKC first and drops zero-width characters and variation
/// selectors, so "🏷️ Tags" and "TAGS\u{200B}" both become "tags".
pub fn normalize_field_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_space = false;

    for ch in name.nfkc() {
        if is_invisible(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            if pending_space && !normalized.is_empty() {
                normalized.push(' ');
            }
            pending_space = false;
            normalized.extend(ch.to_lowercase().filter(|lower| lower.is_alphanumeric()));
        } else {
            pending_space = true;
        }
    }

    normalized
}

fn is_invisible(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{FE00}'..='\u{FE0F}'
    )
}

/// Find a custom field: an exact id match anywhere in the list wins,
/// otherwise the first field matching the type/name heuristic.
pub fn find_custom_field<'a>(
    fields: &'a [RawCustomField],
    selector: &FieldSelector,
) -> Option<&'a RawCustomField> {
    if let Some(id) = selector.preferred_id.as_deref() {
        if let Some(field) = fields.iter().find(|field| field.id.as_deref() == Some(id)) {
            return Some(field);
        }
    }

    fields
        .iter()
        .find(|field| selector.matches_heuristically(field))
}

fn find_first<'a>(
    fields: &'a [RawCustomField],
    selectors: &[FieldSelector],
) -> Option<&'a RawCustomField> {
    selectors
        .iter()
        .find_map(|selector| find_custom_field(fields, selector))
}

// ---------------------------------------------------------------------------
// Option lookup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct OptionLabel {
    label: String,
    color: Option<String>,
}

/// Label/color lookup over a field's declared options, keyed by id, uuid and
/// orderindex
#[derive(Debug, Default)]
struct OptionLookup {
    by_key: HashMap<String, OptionLabel>,
    by_index: HashMap<i64, OptionLabel>,
}

impl OptionLookup {
    fn for_field(field: &RawCustomField) -> Self {
        let mut lookup = Self::default();
        let options = field
            .type_config
            .as_ref()
            .map(|config| config.options.as_slice())
            .unwrap_or_default();

        for option in options {
            let Some(entry) = option_label(option) else {
                continue;
            };
            for key in [&option.id, &option.uuid].into_iter().flatten() {
                lookup.by_key.insert(key.clone(), entry.clone());
            }
            if let Some(index) = option.orderindex.as_ref().and_then(RawId::as_i64) {
                lookup.by_index.insert(index, entry);
            }
        }

        lookup
    }

    fn get(&self, key: &str) -> Option<&OptionLabel> {
        self.by_key.get(key)
    }

    fn get_index(&self, index: i64) -> Option<&OptionLabel> {
        self.by_index.get(&index)
    }
}

fn option_label(option: &RawFieldOption) -> Option<OptionLabel> {
    let label = [&option.name, &option.label, &option.value]
        .into_iter()
        .flatten()
        .find(|label| !label.is_empty())?;
    Some(OptionLabel {
        label: label.clone(),
        color: option.color.clone(),
    })
}

/// One element of an option-valued field
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OptionValue {
    /// Option id (labels fields) or a literal label
    Text(String),
    /// Option orderindex (drop-down fields)
    Index(i64),
    Entry(OptionEntry),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OptionEntry {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    color: Option<String>,
}

impl OptionEntry {
    fn own_label(&self) -> Option<String> {
        let text_value = self.value.as_ref().and_then(Value::as_str);
        [self.name.as_deref(), self.label.as_deref(), self.title.as_deref(), text_value]
            .into_iter()
            .flatten()
            .find(|label| !label.is_empty())
            .map(str::to_string)
    }

    fn key(&self) -> Option<String> {
        self.id
            .as_ref()
            .and_then(RawId::to_text)
            .or_else(|| self.uuid.clone().filter(|uuid| !uuid.is_empty()))
    }
}

/// Split a raw field value into its elements. Unreadable elements are dropped.
fn option_values(value: Option<&Value>) -> Vec<OptionValue> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| OptionValue::deserialize(item).ok())
            .collect(),
        Some(single) => OptionValue::deserialize(single).ok().into_iter().collect(),
    }
}

fn resolve_option(value: &OptionValue, lookup: &OptionLookup) -> Option<OptionLabel> {
    match value {
        OptionValue::Text(text) if text.trim().is_empty() => None,
        OptionValue::Text(text) => Some(lookup.get(text).cloned().unwrap_or(OptionLabel {
            label: text.clone(),
            color: None,
        })),
        OptionValue::Index(index) => lookup.get_index(*index).cloned(),
        OptionValue::Entry(entry) => {
            let known = entry.key().and_then(|key| lookup.get(&key).cloned());
            match entry.own_label() {
                Some(label) => Some(OptionLabel {
                    label,
                    color: entry
                        .color
                        .clone()
                        .or_else(|| known.and_then(|option| option.color)),
                }),
                None => known.or_else(|| {
                    entry.key().map(|key| OptionLabel {
                        label: key,
                        color: entry.color.clone(),
                    })
                }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-resolvers
// ---------------------------------------------------------------------------

/// Tags from the tags custom field, in source order, duplicates kept
pub fn resolve_tags(fields: &[RawCustomField], selectors: &FieldSelectors) -> Vec<Tag> {
    let Some(field) = find_first(fields, &selectors.tags()) else {
        return Vec::new();
    };

    let lookup = OptionLookup::for_field(field);
    option_values(field.value.as_ref())
        .iter()
        .filter_map(|value| resolve_option(value, &lookup))
        .map(|option| Tag {
            name: option.label,
            color: option.color,
        })
        .collect()
}

/// Project label(s) from the project relationship field, joined with ", "
pub fn resolve_project(fields: &[RawCustomField], selectors: &FieldSelectors) -> Option<String> {
    let field = find_first(fields, &selectors.project())?;
    let lookup = OptionLookup::for_field(field);

    let labels: Vec<String> = option_values(field.value.as_ref())
        .iter()
        .filter_map(|value| resolve_option(value, &lookup))
        .map(|option| option.label)
        .collect();

    if labels.is_empty() {
        None
    } else {
        Some(labels.join(", "))
    }
}

/// Deadline from the deadline date field
pub fn resolve_deadline(
    fields: &[RawCustomField],
    selectors: &FieldSelectors,
) -> Option<DateTime<Utc>> {
    let field = find_first(fields, &selectors.deadline())?;
    let value = DateValue::deserialize(field.value.as_ref()?).ok()?;
    parse_date_value(&value)
}

/// Absolute timestamp for a date value; zero and unparseable values are `None`
pub fn parse_date_value(value: &DateValue) -> Option<DateTime<Utc>> {
    parse_date_value_at(value, 0)
}

fn parse_date_value_at(value: &DateValue, depth: usize) -> Option<DateTime<Utc>> {
    match value {
        DateValue::Number(number) => {
            let millis = number
                .as_i64()
                .or_else(|| number.as_f64().map(|float| float.trunc() as i64))?;
            from_epoch_millis(millis)
        }
        DateValue::Text(text) => parse_date_text(text.trim()),
        DateValue::Nested(object) => {
            if depth >= MAX_DATE_DEPTH {
                return None;
            }
            let nested = NESTED_DATE_KEYS
                .iter()
                .find_map(|key| object.get(*key).filter(|value| !value.is_null()))?;
            let nested = DateValue::deserialize(nested).ok()?;
            parse_date_value_at(&nested, depth + 1)
        }
    }
}

fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }

    if let Ok(millis) = text.parse::<i64>() {
        return from_epoch_millis(millis);
    }
    if let Ok(float) = text.parse::<f64>() {
        if float.is_finite() {
            return from_epoch_millis(float.trunc() as i64);
        }
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn field(value: Value) -> RawCustomField {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn normalizes_field_names() {
        assert_eq!(normalize_field_name("  Tags "), "tags");
        assert_eq!(normalize_field_name("🏷️ Tags"), "tags");
        assert_eq!(normalize_field_name("TAGS\u{200B}"), "tags");
        assert_eq!(normalize_field_name("Client / Project--Name"), "client project name");
        assert_eq!(normalize_field_name("Ｄｅａｄｌｉｎｅ"), "deadline");
        assert_eq!(normalize_field_name("---"), "");
    }

    #[test]
    fn id_match_wins_over_earlier_name_match() {
        let fields = vec![
            field(json!({"id": "a", "name": "Tags", "type": "labels"})),
            field(json!({"id": "b", "name": "Categories", "type": "drop_down"})),
        ];

        let selector = FieldSelector {
            preferred_id: Some("b".to_string()),
            name_contains: Some("tags".to_string()),
            field_type: None,
        };
        assert_eq!(
            find_custom_field(&fields, &selector).and_then(|f| f.id.as_deref()),
            Some("b")
        );
    }

    #[test]
    fn heuristic_requires_type_and_name() {
        let fields = vec![
            field(json!({"id": "a", "name": "Deadline", "type": "text"})),
            field(json!({"id": "b", "name": "Deadline 📅", "type": "date"})),
        ];

        let selector = FieldSelector::by_name("deadline").with_type("date");
        assert_eq!(
            find_custom_field(&fields, &selector).and_then(|f| f.id.as_deref()),
            Some("b")
        );
        assert!(find_custom_field(&fields, &FieldSelector::default()).is_none());
    }

    #[test]
    fn unknown_id_falls_back_to_heuristic() {
        let fields = vec![field(json!({"id": "a", "label": "Tags", "type": "labels"}))];
        let selector = FieldSelector {
            preferred_id: Some("missing".to_string()),
            ..FieldSelector::by_name("tags")
        };
        assert!(find_custom_field(&fields, &selector).is_some());
    }

    #[test]
    fn resolves_tag_ids_through_options() {
        let fields = vec![field(json!({
            "id": "f1",
            "name": "Tags",
            "type": "labels",
            "type_config": {"options": [{"id": "o1", "name": "Support", "color": "#111"}]},
            "value": ["o1"]
        }))];

        assert_eq!(
            resolve_tags(&fields, &FieldSelectors::default()),
            vec![Tag { name: "Support".to_string(), color: Some("#111".to_string()) }]
        );
    }

    #[test]
    fn tag_values_keep_order_and_duplicates() {
        let fields = vec![field(json!({
            "name": "Ticket tags",
            "type": "labels",
            "type_config": {"options": [
                {"id": "o1", "label": "Support"},
                {"uuid": "u2", "value": "Downtime", "color": "#f00"}
            ]},
            "value": [
                "u2",
                {"id": "o1"},
                "o1",
                {"name": "Inline", "color": "#0f0"},
                "free text",
                null,
                ""
            ]
        }))];

        let names: Vec<_> = resolve_tags(&fields, &FieldSelectors::default())
            .into_iter()
            .map(|tag| (tag.name, tag.color))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Downtime".to_string(), Some("#f00".to_string())),
                ("Support".to_string(), None),
                ("Support".to_string(), None),
                ("Inline".to_string(), Some("#0f0".to_string())),
                ("free text".to_string(), None),
            ]
        );
    }

    #[test]
    fn single_drop_down_tag_resolves_by_orderindex() {
        let fields = vec![field(json!({
            "name": "Tags",
            "type": "drop_down",
            "type_config": {"options": [
                {"id": "x", "name": "Vulnerability", "orderindex": 0},
                {"id": "y", "name": "Support", "orderindex": "1"}
            ]},
            "value": 1
        }))];

        let tags = resolve_tags(&fields, &FieldSelectors::default());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "Support");
    }

    #[test]
    fn missing_or_malformed_tags_are_empty() {
        assert!(resolve_tags(&[], &FieldSelectors::default()).is_empty());

        let fields = vec![field(json!({"name": "Tags", "value": {"weird": true}}))];
        assert!(resolve_tags(&fields, &FieldSelectors::default()).is_empty());

        let fields = vec![field(json!({"name": "Tags", "value": null}))];
        assert!(resolve_tags(&fields, &FieldSelectors::default()).is_empty());
    }

    #[test]
    fn pinned_tag_field_id_is_used() {
        let fields = vec![
            field(json!({"id": "wrong", "name": "Tags", "value": ["A"]})),
            field(json!({"id": "pinned", "name": "Labels", "value": ["B"]})),
        ];
        let selectors = FieldSelectors {
            tags_field_id: Some("pinned".to_string()),
            ..FieldSelectors::default()
        };
        let tags = resolve_tags(&fields, &selectors);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "B");
    }

    #[test]
    fn joins_project_relationship_labels() {
        let fields = vec![field(json!({
            "name": "Project",
            "type": "list_relationship",
            "value": [
                {"id": "t1", "name": "Apollo"},
                {"id": "t2", "title": "Gemini"},
                {"id": "t3"}
            ]
        }))];

        assert_eq!(
            resolve_project(&fields, &FieldSelectors::default()).as_deref(),
            Some("Apollo, Gemini, t3")
        );
    }

    #[test]
    fn empty_project_is_none() {
        let fields = vec![field(json!({
            "name": "Project",
            "type": "list_relationship",
            "value": []
        }))];
        assert!(resolve_project(&fields, &FieldSelectors::default()).is_none());
        assert!(resolve_project(&[], &FieldSelectors::default()).is_none());
    }

    #[test]
    fn resolves_deadline_from_epoch_string() {
        let fields = vec![field(json!({"name": "Deadline", "type": "date", "value": "1700000000000"}))];
        let deadline = resolve_deadline(&fields, &FieldSelectors::default()).unwrap();
        assert_eq!(deadline.to_rfc3339(), "2023-11-14T22:13:20+00:00");

        let fields = vec![field(json!({"name": "Deadline", "type": "date", "value": "0"}))];
        assert!(resolve_deadline(&fields, &FieldSelectors::default()).is_none());
    }

    #[test]
    fn resolves_deadline_variants() {
        let cases = [
            (json!(1700000000000i64), Some("2023-11-14T22:13:20+00:00")),
            (json!("2024-03-01"), Some("2024-03-01T00:00:00+00:00")),
            (json!("2024-03-01T10:30:00Z"), Some("2024-03-01T10:30:00+00:00")),
            (json!({"start": {"date": "1700000000000"}}), Some("2023-11-14T22:13:20+00:00")),
            (json!({"end": "2024-03-01", "start": null}), Some("2024-03-01T00:00:00+00:00")),
            (json!(0), None),
            (json!("next tuesday"), None),
            (json!({"unrelated": 1}), None),
            (json!([1, 2]), None),
        ];

        for (value, expected) in cases {
            let fields = vec![field(json!({"name": "Deadline", "type": "date", "value": value}))];
            let resolved = resolve_deadline(&fields, &FieldSelectors::default());
            assert_eq!(
                resolved.map(|d| d.to_rfc3339()).as_deref(),
                expected,
                "value {}",
                value
            );
        }
    }

    #[test]
    fn deeply_nested_deadline_is_bounded() {
        let mut value = json!("1700000000000");
        for _ in 0..10 {
            value = json!({ "date": value });
        }
        let fields = vec![field(json!({"name": "Deadline", "type": "date", "value": value}))];
        assert!(resolve_deadline(&fields, &FieldSelectors::default()).is_none());
    }

    proptest! {
        #[test]
        fn normalized_names_are_canonical(name in "[a-zA-Z0-9 _/\\-\u{200B}\u{FE0F}]{0,24}") {
            let normalized = normalize_field_name(&name);
            prop_assert_eq!(normalized.trim(), normalized.as_str());
            prop_assert!(!normalized.contains("  "));
            prop_assert_eq!(normalize_field_name(&normalized), normalized.clone());
        }
    }
}
