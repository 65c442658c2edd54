//! Errors raised by state handlers and the transition engine.

use crate::core::StateKey;
use crate::data::DataError;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Error raised while dispatching a message or running a transition.
///
/// Cloneable so that failures can be broadcast to every subscriber of a
/// machine's failure stream.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    /// A handler reported a failure with a plain message.
    #[error("{0}")]
    Handler(String),

    /// A handler failed with an arbitrary error value.
    #[error("{0}")]
    Custom(Arc<dyn StdError + Send + Sync>),

    #[error("State '{key}' does not exist in this tree")]
    UnknownState { key: StateKey },

    #[error("Entering '{key}' requires a payload of type {expected}")]
    MissingPayload {
        key: StateKey,
        expected: &'static str,
    },

    #[error("Initial child '{selected}' selected by '{parent}' is not one of its children")]
    InvalidInitialChild { parent: StateKey, selected: StateKey },

    #[error("Transition exceeded the redirect limit of {limit}")]
    RedirectLimit { limit: usize },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Nested machine in '{key}' failed: {reason}")]
    Nested { key: StateKey, reason: String },
}

impl StateError {
    /// Failure with a message.
    pub fn msg(message: impl Into<String>) -> Self {
        StateError::Handler(message.into())
    }

    /// Failure wrapping any error value.
    pub fn custom<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        StateError::Custom(Arc::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("sensor offline")]
    struct SensorOffline;

    #[test]
    fn custom_errors_keep_their_message() {
        let error = StateError::custom(SensorOffline);
        assert_eq!(error.to_string(), "sensor offline");
        let cloned = error.clone();
        assert_eq!(cloned.to_string(), "sensor offline");
    }

    #[test]
    fn data_errors_convert() {
        let error: StateError = DataError::Disposed {
            key: StateKey::new("playing"),
        }
        .into();
        assert!(matches!(error, StateError::Data(DataError::Disposed { .. })));
    }
}
