//! Saving the active path of a running machine.

use super::core::MachineCore;
use super::machine::CurrentState;
use crate::checkpoint::{Checkpoint, PersistenceError, SavedNode};
use crate::data::cell::downcast_cell;
use crate::descriptor::NodeKind;
use tracing::debug;

impl MachineCore {
    /// Record every state from the root to the current leaf, encoding the
    /// data of data states and the checkpoint of nested machines.
    pub(crate) async fn save(&mut self) -> Result<Checkpoint, PersistenceError> {
        let Some(leaf) = self.current else {
            return Err(PersistenceError::NotStarted);
        };
        if self.status().is_terminal() && self.active.is_empty() {
            return Err(PersistenceError::Unavailable);
        }

        let mut nodes = Vec::new();
        for id in self.tree.path_from_root(leaf) {
            let node = self.tree.get(id);
            let key = node.key.clone();
            let missing = || PersistenceError::MissingData { key: key.clone() };

            let data = if node.kind == NodeKind::Machine {
                let cell = self.data[id].as_ref().ok_or_else(missing)?;
                let inner = downcast_cell::<CurrentState>(cell)
                    .and_then(|value| value.value())
                    .map_err(|_| missing())?;
                let nested = inner.machine().save().await.map_err(|e| PersistenceError::EncodeFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
                let json = serde_json::to_value(&nested)
                    .map_err(|e| PersistenceError::SerializationFailed(e.to_string()))?;
                Some(json)
            } else if let Some(binding) = &node.data {
                let cell = self.data[id].as_ref().ok_or_else(missing)?;
                let encoded = binding
                    .encode(cell)
                    .ok_or_else(|| PersistenceError::MissingCodec { key: key.clone() })?
                    .map_err(|reason| PersistenceError::EncodeFailed {
                        key: key.clone(),
                        reason,
                    })?;
                Some(encoded)
            } else {
                None
            };
            nodes.push(SavedNode { key, data });
        }

        debug!(states = nodes.len(), "machine saved");
        Ok(Checkpoint::new(self.shared.config.name.clone(), nodes))
    }
}
