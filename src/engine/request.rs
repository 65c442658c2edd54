//! Results returned by message handlers and the transitions they request.

use super::TransitionInfo;
use crate::core::{Payload, StateError, StateKey};
use std::any::Any;
use std::fmt;

/// Action run once per transition, after every exit and before any entry.
pub type TransitionAction = Box<dyn FnOnce(&TransitionInfo) -> Result<(), StateError> + Send>;

/// A request to transition to a target state.
///
/// # Example
///
/// ```rust
/// use treestate::engine::TransitionRequest;
///
/// let request = TransitionRequest::new("unlocked")
///     .with_payload(25u32)
///     .reenter(false);
/// assert_eq!(request.target().as_str(), "unlocked");
/// ```
pub struct TransitionRequest {
    pub(crate) target: StateKey,
    pub(crate) payload: Option<Payload>,
    pub(crate) reenter: Option<bool>,
    pub(crate) action: Option<TransitionAction>,
}

impl TransitionRequest {
    pub fn new(target: impl Into<StateKey>) -> Self {
        Self {
            target: target.into(),
            payload: None,
            reenter: None,
            action: None,
        }
    }

    /// Attach a payload that entered states can read.
    pub fn with_payload<P: Any + Send + Sync>(self, payload: P) -> Self {
        self.with_payload_value(Payload::new(payload))
    }

    pub fn with_payload_value(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Whether the target is exited and re-entered when it is already
    /// active.
    ///
    /// Defaults to `true` when the target is the current leaf and `false`
    /// when it is an active ancestor.
    pub fn reenter(mut self, reenter: bool) -> Self {
        self.reenter = Some(reenter);
        self
    }

    /// Run `action` between the exit and enter phases.
    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: FnOnce(&TransitionInfo) -> Result<(), StateError> + Send + 'static,
    {
        self.action = Some(Box::new(action));
        self
    }

    pub fn target(&self) -> &StateKey {
        &self.target
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }
}

impl fmt::Debug for TransitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRequest")
            .field("target", &self.target)
            .field("payload", &self.payload)
            .field("reenter", &self.reenter)
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Outcome of a state's message handler.
#[derive(Debug)]
pub enum MessageResult {
    /// Handled; the active configuration is unchanged
    Stay,

    /// Handled; transition to the requested target
    GoTo(TransitionRequest),

    /// Not handled; the parent state gets the message next
    Unhandled,
}

impl MessageResult {
    pub fn go_to(target: impl Into<StateKey>) -> Self {
        MessageResult::GoTo(TransitionRequest::new(target))
    }

    pub fn is_handled(&self) -> bool {
        !matches!(self, MessageResult::Unhandled)
    }
}

impl From<TransitionRequest> for MessageResult {
    fn from(request: TransitionRequest) -> Self {
        MessageResult::GoTo(request)
    }
}
