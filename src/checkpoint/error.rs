//! Checkpoint error types.

use crate::core::StateKey;
use thiserror::Error;

/// Errors that can occur while saving or restoring a machine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PersistenceError {
    /// Serialization to JSON or binary format failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Deserialization from JSON or binary format failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Checkpoint version is not supported by this version
    #[error("Unsupported checkpoint version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Checkpoint contains no states")]
    EmptyCheckpoint,

    #[error("Checkpoint refers to unknown state '{key}'")]
    UnknownKey { key: StateKey },

    #[error("Checkpoint path starts at '{key}' instead of the root")]
    NotRootFirst { key: StateKey },

    #[error("Checkpoint path is broken: '{child}' is not a child of '{parent}'")]
    BrokenPath { parent: StateKey, child: StateKey },

    #[error("Checkpoint path ends at composite state '{key}'")]
    EndsAtComposite { key: StateKey },

    #[error("Checkpoint has no data for data state '{key}'")]
    MissingData { key: StateKey },

    #[error("Checkpoint has data for state '{key}', which carries none")]
    UnexpectedData { key: StateKey },

    #[error("Data of state '{key}' could not be decoded: {reason}")]
    DecodeFailed { key: StateKey, reason: String },

    #[error("Data of state '{key}' could not be encoded: {reason}")]
    EncodeFailed { key: StateKey, reason: String },

    /// The state's data was declared without a codec
    #[error("State '{key}' has no data codec and cannot be saved")]
    MissingCodec { key: StateKey },

    /// The nested checkpoint saved for a machine state does not fit its tree
    #[error("Nested checkpoint of machine state '{key}' is invalid: {source}")]
    Nested {
        key: StateKey,
        source: Box<PersistenceError>,
    },

    #[error("Machine has not been started")]
    NotStarted,

    #[error("Machine is no longer running")]
    Unavailable,
}
