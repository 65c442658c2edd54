//! Core value types shared by every layer of the runtime.
//!
//! This module contains the plain data of a state machine:
//! - State identity via [`StateKey`] and [`DataStateKey`]
//! - Type-erased [`Message`] and [`Payload`] envelopes
//! - Immutable transition history
//! - The [`StateError`] raised by handlers and the engine

mod error;
mod history;
mod key;
mod message;

pub use error::StateError;
pub use history::{TransitionHistory, TransitionRecord};
pub use key::{DataStateKey, StateKey};
pub use message::{Message, Payload};
