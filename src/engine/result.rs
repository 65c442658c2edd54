//! Outcomes of dispatching messages, and machine-level errors.

use crate::builder::BuildError;
use crate::checkpoint::PersistenceError;
use crate::core::{Message, StateError, StateKey, TransitionRecord};
use crate::data::DataError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A message some state handled.
#[derive(Debug, Clone)]
pub struct HandledMessage {
    pub message: Message,
    /// Leaf that was current when the message arrived
    pub receiving: StateKey,
    /// State whose handler accepted the message
    pub handling: StateKey,
    /// Transition taken, if the handler requested one
    pub transition: Option<TransitionRecord>,
}

/// A message no active state handled.
#[derive(Debug, Clone)]
pub struct UnhandledMessage {
    pub message: Message,
    pub receiving: StateKey,
    /// States that saw the message, leaf first
    pub notified: Vec<StateKey>,
}

/// A message whose handling raised an error.
#[derive(Debug, Clone)]
pub struct FailedMessage {
    pub message: Message,
    pub receiving: StateKey,
    pub error: StateError,
}

/// Outcome of processing a single message.
#[derive(Debug, Clone)]
pub enum ProcessResult {
    Handled(HandledMessage),
    Unhandled(UnhandledMessage),
    Failed(FailedMessage),
}

impl ProcessResult {
    pub fn is_handled(&self) -> bool {
        matches!(self, ProcessResult::Handled(_))
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self, ProcessResult::Unhandled(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessResult::Failed(_))
    }

    pub fn message(&self) -> &Message {
        match self {
            ProcessResult::Handled(handled) => &handled.message,
            ProcessResult::Unhandled(unhandled) => &unhandled.message,
            ProcessResult::Failed(failed) => &failed.message,
        }
    }

    /// Transition taken while handling, if any.
    pub fn transition(&self) -> Option<&TransitionRecord> {
        match self {
            ProcessResult::Handled(handled) => handled.transition.as_ref(),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&StateError> {
        match self {
            ProcessResult::Failed(failed) => Some(&failed.error),
            _ => None,
        }
    }
}

/// Lifecycle of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineStatus {
    NotStarted,
    Running,
    /// A final state was entered
    Done,
    /// Stopped by the caller; exit handlers ran
    Stopped,
    /// Disposed; exit handlers did not run
    Disposed,
}

impl MachineStatus {
    /// Whether the machine can never process another message.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MachineStatus::Done | MachineStatus::Stopped | MachineStatus::Disposed
        )
    }
}

/// Errors returned by machine operations.
#[derive(Debug, Clone, Error)]
pub enum MachineError {
    #[error("Machine has not been started")]
    NotStarted,

    #[error("Machine has already been started")]
    AlreadyStarted,

    #[error("Machine is done")]
    Done,

    #[error("Machine has been stopped")]
    Stopped,

    #[error("Machine has been disposed")]
    Disposed,

    #[error("Machine failed to start: {0}")]
    Start(StateError),

    #[error("Machine failed to stop: {0}")]
    Stop(StateError),

    /// Raised for failed dispatches under `FailurePolicy::Propagate`
    #[error("Message handling failed: {0}")]
    Dispatch(StateError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

impl MachineError {
    /// Error for an operation that needs a running machine.
    pub(crate) fn not_running(status: MachineStatus) -> Option<Self> {
        match status {
            MachineStatus::Running => None,
            MachineStatus::NotStarted => Some(MachineError::NotStarted),
            MachineStatus::Done => Some(MachineError::Done),
            MachineStatus::Stopped => Some(MachineError::Stopped),
            MachineStatus::Disposed => Some(MachineError::Disposed),
        }
    }
}
