//! Test provider states and events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type TestProviderId = String;

/// Store id used for the built-in test provider store.
pub const TEST_PROVIDER_STORE_ID: &str = "core/test-provider";

pub const RUN_ALL_EVENT: &str = "run-all";
pub const CLEAR_ALL_EVENT: &str = "clear-all";
pub const SETTINGS_CHANGED_EVENT: &str = "settings-changed";

/// Lifecycle of one test provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TestProviderState {
    #[default]
    #[serde(rename = "test-provider-state:pending")]
    Pending,
    #[serde(rename = "test-provider-state:running")]
    Running,
    #[serde(rename = "test-provider-state:succeeded")]
    Succeeded,
    #[serde(rename = "test-provider-state:crashed")]
    Crashed,
}

impl TestProviderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestProviderState::Pending => "test-provider-state:pending",
            TestProviderState::Running => "test-provider-state:running",
            TestProviderState::Succeeded => "test-provider-state:succeeded",
            TestProviderState::Crashed => "test-provider-state:crashed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TestProviderState::Succeeded | TestProviderState::Crashed)
    }
}

impl fmt::Display for TestProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store state. Providers missing from the map are pending.
pub type TestProviderStateByProviderId = BTreeMap<TestProviderId, TestProviderState>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SettingsChangedPayload {
    pub test_provider_id: TestProviderId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_tags_match_display() {
        for state in [
            TestProviderState::Pending,
            TestProviderState::Running,
            TestProviderState::Succeeded,
            TestProviderState::Crashed,
        ] {
            let wire = serde_json::to_value(state).unwrap();
            assert_eq!(wire, serde_json::Value::String(state.to_string()));
        }
    }

    #[test]
    fn test_default_is_pending() {
        assert_eq!(TestProviderState::default(), TestProviderState::Pending);
        assert!(!TestProviderState::Running.is_terminal());
        assert!(TestProviderState::Crashed.is_terminal());
    }
}
