//! Validation of a checkpoint against a tree.

use super::{Checkpoint, PersistenceError, CHECKPOINT_VERSION};
use crate::builder::{NodeId, RuntimeTree};
use crate::core::StateKey;
use crate::data::cell::DataCell;
use crate::descriptor::{InitialMachine, MachineStateSpec, NodeKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Decoded data for one node of a restore plan.
pub(crate) enum RestoredData {
    Cell(DataCell),
    Machine(NestedRestore),
}

/// Saved state of a nested machine.
pub(crate) enum NestedRestore {
    /// Checked against the tree the nested machine will run
    Planned { tree: Arc<RuntimeTree>, plan: RestorePlan },
    /// Attached machines are only known on entry, so their checkpoint is
    /// checked when it is loaded into them
    Unchecked(Checkpoint),
}

/// A checkpoint that has been fully checked against a tree.
pub(crate) struct RestorePlan {
    pub(crate) leaf: NodeId,
    data: HashMap<NodeId, RestoredData>,
}

impl RestorePlan {
    pub(crate) fn take(&mut self, id: NodeId) -> Option<RestoredData> {
        self.data.remove(&id)
    }
}

/// Check `checkpoint` against `tree` and decode its data.
///
/// Keys are checked first, then the shape of the path, then data. Nested
/// checkpoints are checked the same way against their own trees. Nothing
/// is entered here, so any error leaves the target machine untouched.
pub(crate) fn restore_plan(
    tree: &RuntimeTree,
    checkpoint: &Checkpoint,
) -> Result<RestorePlan, PersistenceError> {
    if checkpoint.version != CHECKPOINT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: checkpoint.version,
            supported: CHECKPOINT_VERSION,
        });
    }
    if checkpoint.nodes.is_empty() {
        return Err(PersistenceError::EmptyCheckpoint);
    }

    let path = checkpoint
        .nodes
        .iter()
        .map(|node| {
            tree.index_of(&node.key).ok_or_else(|| PersistenceError::UnknownKey {
                key: node.key.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    check_path(tree, &path)?;

    let mut data = HashMap::new();
    for (&id, saved) in path.iter().zip(&checkpoint.nodes) {
        let node = tree.get(id);
        let key = &node.key;
        let restored = match (node.kind, &node.data, &saved.data) {
            (NodeKind::Machine, _, Some(json)) => {
                let spec = node
                    .machine
                    .as_ref()
                    .ok_or_else(|| PersistenceError::UnexpectedData { key: key.clone() })?;
                let nested: Checkpoint = serde_json::from_value(json.clone()).map_err(|e| {
                    PersistenceError::DecodeFailed {
                        key: key.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Some(RestoredData::Machine(nested_restore(key, spec, nested)?))
            }
            (_, Some(binding), Some(json)) => {
                let cell = binding
                    .decode(key, json)
                    .ok_or_else(|| PersistenceError::MissingCodec { key: key.clone() })?
                    .map_err(|reason| PersistenceError::DecodeFailed {
                        key: key.clone(),
                        reason,
                    })?;
                Some(RestoredData::Cell(cell))
            }
            (NodeKind::Machine, _, None) | (_, Some(_), None) => {
                return Err(PersistenceError::MissingData { key: key.clone() });
            }
            (_, None, Some(_)) => {
                return Err(PersistenceError::UnexpectedData { key: key.clone() });
            }
            (_, None, None) => None,
        };
        if let Some(restored) = restored {
            data.insert(id, restored);
        }
    }

    let leaf = path.last().copied().unwrap_or_else(|| tree.root());
    Ok(RestorePlan { leaf, data })
}

fn nested_restore(
    key: &StateKey,
    spec: &MachineStateSpec,
    checkpoint: Checkpoint,
) -> Result<NestedRestore, PersistenceError> {
    let tree = match &spec.initial {
        InitialMachine::Descriptor(descriptor) => {
            let tree = RuntimeTree::build(descriptor()).map_err(|e| PersistenceError::DecodeFailed {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            Arc::new(tree)
        }
        InitialMachine::Tree(tree) => Arc::clone(tree),
        InitialMachine::Attach(_) => return Ok(NestedRestore::Unchecked(checkpoint)),
    };
    let plan = restore_plan(&tree, &checkpoint).map_err(|source| PersistenceError::Nested {
        key: key.clone(),
        source: Box::new(source),
    })?;
    Ok(NestedRestore::Planned { tree, plan })
}

fn check_path(tree: &RuntimeTree, path: &[NodeId]) -> Result<(), PersistenceError> {
    let Some((&first, _)) = path.split_first() else {
        return Err(PersistenceError::EmptyCheckpoint);
    };
    if first != tree.root() {
        return Err(PersistenceError::NotRootFirst {
            key: tree.key(first).clone(),
        });
    }
    for pair in path.windows(2) {
        if tree.parent(pair[1]) != Some(pair[0]) {
            return Err(PersistenceError::BrokenPath {
                parent: tree.key(pair[0]).clone(),
                child: tree.key(pair[1]).clone(),
            });
        }
    }
    let last = path[path.len() - 1];
    if tree.get(last).kind.is_composite() {
        return Err(PersistenceError::EndsAtComposite {
            key: tree.key(last).clone(),
        });
    }
    Ok(())
}
