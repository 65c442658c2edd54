//! Type-erased message and payload envelopes.
//!
//! Handlers receive messages of any type and extract the ones they
//! understand with [`Message::downcast_ref`]. A message whose type does not
//! match is simply left unhandled.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A message posted to a state machine.
///
/// Cloning is cheap; the wrapped value is shared.
///
/// # Example
///
/// ```rust
/// use treestate::core::Message;
///
/// #[derive(Debug, PartialEq)]
/// struct InsertCoin(u32);
///
/// let message = Message::new(InsertCoin(25));
/// assert_eq!(message.downcast_ref::<InsertCoin>(), Some(&InsertCoin(25)));
/// assert!(message.downcast_ref::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct Message {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Message {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the message as `T` if it has that type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Name of the wrapped type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.type_name)
            .finish()
    }
}

/// Contextual data carried by a transition into the states it enters.
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Push;

    #[test]
    fn downcast_matches_only_the_wrapped_type() {
        let message = Message::new(Push);
        assert!(message.is::<Push>());
        assert_eq!(message.downcast_ref::<Push>(), Some(&Push));
        assert!(message.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn clones_share_the_value() {
        let payload = Payload::new(String::from("ticket"));
        let copy = payload.clone();
        assert_eq!(copy.downcast_ref::<String>().map(String::as_str), Some("ticket"));
        assert!(payload.type_name().ends_with("String"));
    }
}
