//! Machine configuration.

use serde::{Deserialize, Serialize};

/// How a failed dispatch is reported to the poster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// `post` resolves to `ProcessResult::Failed`
    #[default]
    Record,

    /// `post` resolves to `Err(MachineError::Dispatch)`
    Propagate,
}

/// Options applied to a single machine.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```rust
/// use treestate::config::{FailurePolicy, MachineConfig};
///
/// let config = MachineConfig::from_json_str(r#"{ "name": "turnstile", "failure_policy": "propagate" }"#).unwrap();
/// assert_eq!(config.name, "turnstile");
/// assert_eq!(config.failure_policy, FailurePolicy::Propagate);
/// assert_eq!(config.redirect_limit, 16);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Name used in logs and saved checkpoints
    pub name: String,

    pub failure_policy: FailurePolicy,

    /// Redirects allowed within one transition before it fails
    pub redirect_limit: usize,

    /// Buffer size of each event stream. Slow subscribers that fall
    /// further behind miss events.
    pub event_capacity: usize,

    /// Transitions kept in the in-memory history
    pub history_limit: usize,

    /// Subscriber that receives this machine's log events instead of the
    /// global one.
    #[serde(skip)]
    pub log_sink: Option<tracing::Dispatch>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            name: "tree_state_machine".to_string(),
            failure_policy: FailurePolicy::Record,
            redirect_limit: 16,
            event_capacity: 256,
            history_limit: 64,
            log_sink: None,
        }
    }
}

impl MachineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_redirect_limit(mut self, limit: usize) -> Self {
        self.redirect_limit = limit;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_log_sink(mut self, dispatch: tracing::Dispatch) -> Self {
        self.log_sink = Some(dispatch);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = MachineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Record);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.history_limit, 64);
        assert!(config.log_sink.is_none());
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = MachineConfig::default()
            .with_name("player")
            .with_redirect_limit(2)
            .with_failure_policy(FailurePolicy::Propagate);
        assert_eq!(config.name, "player");
        assert_eq!(config.redirect_limit, 2);
        assert_eq!(config.failure_policy, FailurePolicy::Propagate);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = MachineConfig::default().with_history_limit(3);
        let json = serde_json::to_string(&config).unwrap();
        let restored = MachineConfig::from_json_str(&json).unwrap();
        assert_eq!(restored.history_limit, 3);
    }
}
