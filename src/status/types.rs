//! Status records and the store's state shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type StoryId = String;

pub type StatusTypeId = String;

/// Store id used for the built-in status store.
pub const STATUS_STORE_ID: &str = "core/status";

/// Event type broadcast when statuses are selected in the UI.
pub const SELECT_EVENT: &str = "select";

/// Severity of a status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StatusValue {
    #[serde(rename = "status-value:pending")]
    Pending,
    #[serde(rename = "status-value:success")]
    Success,
    #[serde(rename = "status-value:error")]
    Error,
    #[serde(rename = "status-value:warning")]
    Warning,
    #[default]
    #[serde(rename = "status-value:unknown")]
    Unknown,
}

/// One feature's verdict about one story.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub story_id: StoryId,
    pub type_id: StatusTypeId,
    pub value: StatusValue,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidebar_context_menu: Option<bool>,
}

impl Status {
    pub fn new(story_id: impl Into<String>, type_id: impl Into<String>, value: StatusValue) -> Self {
        Self {
            story_id: story_id.into(),
            type_id: type_id.into(),
            value,
            title: String::new(),
            description: String::new(),
            data: None,
            sidebar_context_menu: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_sidebar_context_menu(mut self, show: bool) -> Self {
        self.sidebar_context_menu = Some(show);
        self
    }
}

/// Store state: type id -> statuses, at most one per story.
pub type StatusesByTypeId = BTreeMap<StatusTypeId, Vec<Status>>;

/// All statuses as one list, bucket by bucket.
pub fn flatten(state: &StatusesByTypeId) -> Vec<Status> {
    state.values().flatten().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_shape() {
        let status = Status::new("story-1", "addon-a11y", StatusValue::Warning)
            .with_title("Accessibility")
            .with_sidebar_context_menu(false);

        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "storyId": "story-1",
                "typeId": "addon-a11y",
                "value": "status-value:warning",
                "title": "Accessibility",
                "description": "",
                "sidebarContextMenu": false
            })
        );
    }

    #[test]
    fn test_flatten_walks_buckets_in_order() {
        let mut state = StatusesByTypeId::new();
        state.insert(
            "b".to_string(),
            vec![Status::new("s1", "b", StatusValue::Success)],
        );
        state.insert(
            "a".to_string(),
            vec![
                Status::new("s1", "a", StatusValue::Error),
                Status::new("s2", "a", StatusValue::Pending),
            ],
        );

        let flat: Vec<(String, String)> = flatten(&state)
            .into_iter()
            .map(|s| (s.type_id, s.story_id))
            .collect();
        assert_eq!(
            flat,
            vec![
                ("a".to_string(), "s1".to_string()),
                ("a".to_string(), "s2".to_string()),
                ("b".to_string(), "s1".to_string()),
            ]
        );
    }
}
