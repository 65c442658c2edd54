//! Errors raised while building a state tree.

use crate::core::StateKey;
use crate::descriptor::NodeKind;
use thiserror::Error;

/// A single structural problem found in a state tree description.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeViolation {
    #[error("Duplicate state key '{key}'")]
    DuplicateKey { key: StateKey },

    #[error("Top-level state '{key}' is a {kind:?} node, not a root")]
    NotRoot { key: StateKey, kind: NodeKind },

    #[error("State '{key}' is a root but is nested under another state")]
    NestedRoot { key: StateKey },

    #[error("Composite state '{key}' has no children")]
    EmptyComposite { key: StateKey },

    #[error("Composite state '{key}' does not name an initial child")]
    MissingInitialChild { key: StateKey },

    #[error("Initial child '{child}' is not a child of '{parent}'")]
    InvalidInitialChild { parent: StateKey, child: StateKey },

    #[error("{kind:?} state '{key}' cannot have children")]
    LeafWithChildren { key: StateKey, kind: NodeKind },

    #[error(
        "State '{key}' declares parent '{declared}' but is nested under {}",
        .actual.as_ref().map_or("nothing", |k| k.as_str())
    )]
    ParentMismatch {
        key: StateKey,
        declared: StateKey,
        actual: Option<StateKey>,
    },

    #[error("State '{key}' declares itself as its parent")]
    CyclicParent { key: StateKey },

    #[error("State '{from}' declares transition target '{target}', which does not exist")]
    DanglingTarget { from: StateKey, target: StateKey },

    #[error("Machine state '{key}' cannot have its own behavior")]
    MachineBehavior { key: StateKey },

    #[error("Machine state '{key}' cannot carry data")]
    MachineData { key: StateKey },
}

/// Errors that can occur when building a runtime tree or a machine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    /// Every violation found, not only the first
    #[error("Invalid state tree ({} violation(s)): {}", .violations.len(), describe(.violations))]
    InvalidTree { violations: Vec<TreeViolation> },
}

impl BuildError {
    pub fn violations(&self) -> &[TreeViolation] {
        match self {
            BuildError::InvalidTree { violations } => violations,
        }
    }
}

fn describe(violations: &[TreeViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
