//! Checkpoint and resume functionality for tree state machines.
//!
//! A checkpoint records the active path from the root to the current leaf,
//! together with the encoded data of every data state on that path. Nested
//! machines are saved as nested checkpoints.
//!
//! Loading validates the entire checkpoint against the tree before any
//! state is entered, so a bad checkpoint leaves the machine untouched.

use crate::core::StateKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;
mod restore;

pub use error::PersistenceError;

pub(crate) use restore::{restore_plan, NestedRestore, RestorePlan, RestoredData};

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// One state on the saved active path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedNode {
    pub key: StateKey,

    /// Encoded data; present exactly for data and machine states
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Serializable snapshot of a machine's active path.
///
/// Does NOT include behaviors or pending timers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: Uuid,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Name of the machine that was saved
    pub machine: String,

    /// Active path, root first
    pub nodes: Vec<SavedNode>,
}

impl Checkpoint {
    pub(crate) fn new(machine: impl Into<String>, nodes: Vec<SavedNode>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            machine: machine.into(),
            nodes,
        }
    }

    /// Key of the saved current leaf.
    pub fn current(&self) -> Option<&StateKey> {
        self.nodes.last().map(|node| &node.key)
    }

    pub fn data_of(&self, key: &StateKey) -> Option<&serde_json::Value> {
        self.nodes
            .iter()
            .find(|node| &node.key == key)
            .and_then(|node| node.data.as_ref())
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PersistenceError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        serde_json::from_str(json).map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))
    }

    /// Compact binary form.
    pub fn to_binary(&self) -> Result<Vec<u8>, PersistenceError> {
        let record = BinaryCheckpoint::try_from(self)?;
        bincode::serialize(&record).map_err(|e| PersistenceError::SerializationFailed(e.to_string()))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let record: BinaryCheckpoint = bincode::deserialize(bytes)
            .map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))?;
        record.try_into()
    }
}

// bincode is not self-describing, so encoded data travels as JSON text.
#[derive(Serialize, Deserialize)]
struct BinaryCheckpoint {
    version: u32,
    id: Uuid,
    timestamp: DateTime<Utc>,
    machine: String,
    nodes: Vec<(String, Option<String>)>,
}

impl TryFrom<&Checkpoint> for BinaryCheckpoint {
    type Error = PersistenceError;

    fn try_from(checkpoint: &Checkpoint) -> Result<Self, Self::Error> {
        let nodes = checkpoint
            .nodes
            .iter()
            .map(|node| {
                let data = node
                    .data
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| PersistenceError::SerializationFailed(e.to_string()))?;
                Ok((node.key.as_str().to_string(), data))
            })
            .collect::<Result<_, PersistenceError>>()?;

        Ok(Self {
            version: checkpoint.version,
            id: checkpoint.id,
            timestamp: checkpoint.timestamp,
            machine: checkpoint.machine.clone(),
            nodes,
        })
    }
}

impl TryFrom<BinaryCheckpoint> for Checkpoint {
    type Error = PersistenceError;

    fn try_from(record: BinaryCheckpoint) -> Result<Self, Self::Error> {
        let nodes = record
            .nodes
            .into_iter()
            .map(|(key, data)| {
                let data = data
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()
                    .map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))?;
                Ok(SavedNode {
                    key: StateKey::from(key),
                    data,
                })
            })
            .collect::<Result<_, PersistenceError>>()?;

        Ok(Self {
            version: record.version,
            id: record.id,
            timestamp: record.timestamp,
            machine: record.machine,
            nodes,
        })
    }
}
