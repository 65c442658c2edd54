//! Typed entry channels.

use crate::core::{Payload, StateError, StateKey};
use crate::engine::{MessageResult, TransitionRequest};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

/// Binds a target state to the payload type `P` required to enter it.
///
/// Transitions built through a channel always carry a `P`, so a state
/// whose initial data is read from the channel can never be entered
/// without it.
///
/// # Example
///
/// ```rust
/// use treestate::descriptor::Channel;
///
/// struct Credentials { user: String }
///
/// let authenticating: Channel<Credentials> = Channel::new("authenticating");
/// let request = authenticating.go_to(Credentials { user: "ada".into() });
/// assert_eq!(request.target().as_str(), "authenticating");
/// ```
pub struct Channel<P> {
    target: StateKey,
    _payload: PhantomData<fn(P)>,
}

impl<P: Any + Send + Sync> Channel<P> {
    pub fn new(target: impl Into<StateKey>) -> Self {
        Self {
            target: target.into(),
            _payload: PhantomData,
        }
    }

    pub fn target(&self) -> &StateKey {
        &self.target
    }

    /// Transition request into the channel's target carrying `payload`.
    pub fn go_to(&self, payload: P) -> TransitionRequest {
        TransitionRequest::new(self.target.clone()).with_payload(payload)
    }

    /// Handler result that transitions through this channel.
    pub fn result(&self, payload: P) -> MessageResult {
        MessageResult::GoTo(self.go_to(payload))
    }

    /// Extract the channel's payload, failing when it is missing or has
    /// another type. `entering` names the state that needs it.
    pub(crate) fn extract<'p>(
        &self,
        entering: &StateKey,
        payload: Option<&'p Payload>,
    ) -> Result<&'p P, StateError> {
        payload
            .and_then(|p| p.downcast_ref::<P>())
            .ok_or_else(|| StateError::MissingPayload {
                key: entering.clone(),
                expected: std::any::type_name::<P>(),
            })
    }
}

impl<P> Clone for Channel<P> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P> fmt::Debug for Channel<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Channel<{}>({})",
            std::any::type_name::<P>(),
            self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_to_carries_typed_payload() {
        let channel: Channel<u32> = Channel::new("dispensing");
        let request = channel.go_to(3);
        assert_eq!(request.target(), &StateKey::new("dispensing"));
        assert_eq!(request.payload().and_then(|p| p.downcast_ref::<u32>()), Some(&3));
    }

    #[test]
    fn extract_rejects_missing_or_mistyped_payload() {
        let channel: Channel<u32> = Channel::new("dispensing");
        let key = StateKey::new("dispensing");

        assert!(matches!(
            channel.extract(&key, None),
            Err(StateError::MissingPayload { .. })
        ));

        let wrong = Payload::new("three");
        assert!(channel.extract(&key, Some(&wrong)).is_err());

        let right = Payload::new(3u32);
        assert_eq!(channel.extract(&key, Some(&right)).unwrap(), &3);
    }
}
