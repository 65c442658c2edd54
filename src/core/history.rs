//! Transition records and history tracking.
//!
//! Provides immutable tracking of the transitions a machine has completed,
//! following the same value semantics as the rest of the core types.

use super::{Payload, StateKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of one completed transition.
///
/// `exited` lists states leaf-first, `entered` lists states root-first, so
/// together they describe the exact exit/enter path the engine walked.
///
/// # Example
///
/// ```rust
/// use treestate::core::{StateKey, TransitionRecord};
/// use chrono::Utc;
///
/// let record = TransitionRecord {
///     from: Some(StateKey::new("locked")),
///     to: StateKey::new("unlocked"),
///     target: StateKey::new("unlocked"),
///     lca: Some(StateKey::new("root")),
///     exited: vec![StateKey::new("locked")],
///     entered: vec![StateKey::new("unlocked")],
///     is_final: false,
///     timestamp: Utc::now(),
///     payload: None,
/// };
/// assert!(record.exited_state(&StateKey::new("locked")));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Leaf that was current before the transition; `None` for the initial entry
    pub from: Option<StateKey>,
    /// Leaf that is current after the transition
    pub to: StateKey,
    /// State that was requested as the target
    pub target: StateKey,
    /// Least common ancestor of `from` and `target`; `None` when the root itself was exited
    pub lca: Option<StateKey>,
    pub exited: Vec<StateKey>,
    pub entered: Vec<StateKey>,
    /// Whether `to` is a final state
    pub is_final: bool,
    /// When the transition completed
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub payload: Option<Payload>,
}

impl TransitionRecord {
    pub fn exited_state(&self, key: &StateKey) -> bool {
        self.exited.contains(key)
    }

    pub fn entered_state(&self, key: &StateKey) -> bool {
        self.entered.contains(key)
    }
}

/// Ordered history of transitions.
///
/// History is immutable - `record` returns a new history with the
/// transition added.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransitionHistory {
    transitions: Vec<TransitionRecord>,
}

impl TransitionHistory {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    /// Record a transition, returning a new history.
    pub fn record(&self, transition: TransitionRecord) -> Self {
        let mut transitions = self.transitions.clone();
        transitions.push(transition);
        Self { transitions }
    }

    /// Record a transition, keeping at most `limit` of the most recent ones.
    pub fn record_bounded(&self, transition: TransitionRecord, limit: usize) -> Self {
        let mut history = self.record(transition);
        if history.transitions.len() > limit {
            let excess = history.transitions.len() - limit;
            history.transitions.drain(..excess);
        }
        history
    }

    /// Leaves visited, in order: the first recorded source (when there is
    /// one), then the destination leaf of each transition.
    pub fn get_path(&self) -> Vec<&StateKey> {
        let mut path = Vec::new();
        if let Some(from) = self.transitions.first().and_then(|t| t.from.as_ref()) {
            path.push(from);
        }
        for transition in &self.transitions {
            path.push(&transition.to);
        }
        path
    }

    /// Time between the first and last recorded transition.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.transitions.first(), self.transitions.last()) {
            last.timestamp
                .signed_duration_since(first.timestamp)
                .to_std()
                .ok()
        } else {
            None
        }
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.transitions.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: Option<&str>, to: &str) -> TransitionRecord {
        TransitionRecord {
            from: from.map(StateKey::new),
            to: StateKey::new(to),
            target: StateKey::new(to),
            lca: Some(StateKey::new("root")),
            exited: from.map(StateKey::new).into_iter().collect(),
            entered: vec![StateKey::new(to)],
            is_final: false,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    #[test]
    fn new_history_is_empty() {
        let history = TransitionHistory::new();
        assert!(history.transitions().is_empty());
        assert!(history.get_path().is_empty());
        assert!(history.duration().is_none());
    }

    #[test]
    fn record_is_immutable() {
        let history = TransitionHistory::new();
        let next = history.record(record(None, "locked"));

        assert_eq!(history.transitions().len(), 0);
        assert_eq!(next.transitions().len(), 1);
    }

    #[test]
    fn path_follows_leaves() {
        let history = TransitionHistory::new()
            .record(record(Some("locked"), "unlocked"))
            .record(record(Some("unlocked"), "locked"));

        let path: Vec<&str> = history.get_path().iter().map(|k| k.as_str()).collect();
        assert_eq!(path, vec!["locked", "unlocked", "locked"]);
    }

    #[test]
    fn initial_entry_has_no_source_in_path() {
        let history = TransitionHistory::new()
            .record(record(None, "locked"))
            .record(record(Some("locked"), "unlocked"));

        let path: Vec<&str> = history.get_path().iter().map(|k| k.as_str()).collect();
        assert_eq!(path, vec!["locked", "unlocked"]);
    }

    #[test]
    fn bounded_record_drops_oldest() {
        let mut history = TransitionHistory::new();
        for i in 0..5 {
            history = history.record_bounded(record(None, &format!("s{i}")), 3);
        }
        let kept: Vec<&str> = history
            .transitions()
            .iter()
            .map(|t| t.to.as_str())
            .collect();
        assert_eq!(kept, vec!["s2", "s3", "s4"]);
    }

    #[test]
    fn history_serializes_without_payloads() {
        let mut entry = record(Some("a"), "b");
        entry.payload = Some(Payload::new(5u8));
        let history = TransitionHistory::new().record(entry);

        let json = serde_json::to_string(&history).unwrap();
        let restored: TransitionHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.transitions().len(), 1);
        assert!(restored.transitions()[0].payload.is_none());
    }
}
