//! Typed, reactive data owned by data states.
//!
//! A data state carries a [`DataValue`] for exactly as long as it is
//! active. The value is computed on entry, may be updated while the state
//! is active, and is closed irreversibly when the state exits.

pub(crate) mod cell;
mod value;

use crate::core::StateKey;
use thiserror::Error;

pub use value::{DataSubscription, DataValue, DataView};

/// Bound satisfied by every type that can be carried by a data state.
pub trait StateData: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> StateData for T {}

/// Errors raised when accessing state data.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    /// The owning state has exited and its value was closed
    #[error("Data value of state '{key}' has been disposed")]
    Disposed { key: StateKey },

    #[error("State '{key}' carries data of type {found}, not {expected}")]
    TypeMismatch {
        key: StateKey,
        expected: &'static str,
        found: &'static str,
    },

    #[error("State '{key}' is not active")]
    NotActive { key: StateKey },

    #[error("State '{key}' does not carry data")]
    NoData { key: StateKey },

    #[error("No active state carries data of type {expected}")]
    NotFound { expected: &'static str },
}
