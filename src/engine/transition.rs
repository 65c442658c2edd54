//! Exit and entry sequencing.
//!
//! A transition exits from the current leaf up to (not including) the
//! anchor, runs the request's action, then enters from below the anchor
//! down to the target and on through initial children until a leaf is
//! reached. Entry handlers and initial data may redirect, which restarts
//! the entry phase from the deepest state entered so far.

use super::context::{TransitionInfo, TransitionPhase};
use super::core::MachineCore;
use super::request::TransitionRequest;
use super::result::MachineStatus;
use crate::builder::NodeId;
use crate::checkpoint::{RestorePlan, RestoredData};
use crate::core::{StateError, StateKey, TransitionRecord};
use crate::descriptor::{InitialCell, InitialChild, InitialDataSource, NodeKind};
use chrono::Utc;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// States exited and entered so far, in order.
#[derive(Default)]
pub(crate) struct TransitionPath {
    pub(crate) exited: Vec<StateKey>,
    pub(crate) entered: Vec<StateKey>,
}

enum EnterOutcome {
    Entered,
    /// Initial data redirected before the state was entered
    RedirectedBefore(TransitionRequest),
    /// The enter handler redirected after the state was entered
    RedirectedAfter(TransitionRequest),
}

impl MachineCore {
    pub(crate) fn resolve(&self, key: &StateKey) -> Result<NodeId, StateError> {
        self.tree
            .index_of(key)
            .ok_or_else(|| StateError::UnknownState { key: key.clone() })
    }

    /// Deepest node that stays active when moving from `from` to `target`.
    /// `None` means the root itself is exited.
    fn anchor(&self, from: NodeId, target: NodeId, reenter: Option<bool>) -> Option<NodeId> {
        let lca = self.tree.lca_of(from, target);
        if lca != target {
            return Some(lca);
        }
        // Target is `from` or one of its ancestors
        if reenter.unwrap_or(target == from) {
            self.tree.parent(target)
        } else {
            Some(target)
        }
    }

    /// Perform a transition requested while `from` was the current leaf.
    pub(crate) async fn transition(
        &mut self,
        from: NodeId,
        request: TransitionRequest,
    ) -> Result<TransitionRecord, StateError> {
        let TransitionRequest {
            target,
            payload,
            reenter,
            action,
        } = request;
        let target_id = self.resolve(&target)?;
        let anchor = self.anchor(from, target_id, reenter);
        let mut info = TransitionInfo {
            from: Some(self.key(from)),
            target,
            lca: anchor.map(|id| self.key(id)),
            payload,
        };
        trace!(from = %self.key(from), target = %info.target, "transition");

        let mut path = TransitionPath::default();
        self.exit_until(from, anchor, &info, &mut path).await?;
        if let Some(action) = action {
            action(&info)?;
        }
        let leaf = self
            .enter_toward(anchor, target_id, &mut info, &mut path, &mut None)
            .await?;
        Ok(self.complete(Some(from), leaf, &info, path))
    }

    /// Exit `from` and its ancestors, stopping below `stop`.
    pub(crate) async fn exit_until(
        &mut self,
        from: NodeId,
        stop: Option<NodeId>,
        info: &TransitionInfo,
        path: &mut TransitionPath,
    ) -> Result<(), StateError> {
        let mut node = Some(from);
        while node != stop {
            let Some(id) = node else {
                break;
            };
            self.exit_node(id, info).await?;
            path.exited.push(self.key(id));
            node = self.tree.parent(id);
        }
        Ok(())
    }

    async fn exit_node(&mut self, id: NodeId, info: &TransitionInfo) -> Result<(), StateError> {
        trace!(state = %self.key(id), "exiting");
        self.run_transition_handler(id, info, TransitionPhase::Exit).await?;
        self.release_node(id);
        if self.active.last() == Some(&id) {
            self.active.pop();
        }
        self.publish_active();
        Ok(())
    }

    /// Enter from below `anchor` down to `target`, then through initial
    /// children to a leaf. Follows redirects up to the configured limit.
    pub(crate) async fn enter_toward(
        &mut self,
        anchor: Option<NodeId>,
        target: NodeId,
        info: &mut TransitionInfo,
        path: &mut TransitionPath,
        restore: &mut Option<RestorePlan>,
    ) -> Result<NodeId, StateError> {
        let limit = self.shared.config.redirect_limit;
        let mut redirects = 0;
        let mut anchor = anchor;
        let mut target = target;

        'redirect: loop {
            let mut pending: VecDeque<NodeId> = self.tree.path_between(anchor, target).into();
            let mut deepest = anchor;

            loop {
                let next = match pending.pop_front() {
                    Some(next) => next,
                    None => {
                        let Some(parent) = deepest else {
                            return Err(StateError::UnknownState {
                                key: info.target.clone(),
                            });
                        };
                        if self.tree.get(parent).kind.is_leaf() {
                            return Ok(parent);
                        }
                        self.initial_child(parent, info)?
                    }
                };

                let request = match self.enter_node(next, info, restore).await? {
                    EnterOutcome::Entered => {
                        path.entered.push(self.key(next));
                        deepest = Some(next);
                        continue;
                    }
                    EnterOutcome::RedirectedBefore(request) => request,
                    EnterOutcome::RedirectedAfter(request) => {
                        path.entered.push(self.key(next));
                        deepest = Some(next);
                        request
                    }
                };

                redirects += 1;
                if redirects > limit {
                    return Err(StateError::RedirectLimit { limit });
                }

                let TransitionRequest {
                    target: redirect_key,
                    payload,
                    reenter,
                    action,
                } = request;
                let redirect_target = self.resolve(&redirect_key)?;
                debug!(from = %self.key(next), target = %redirect_key, "redirecting");

                let new_anchor = match deepest {
                    Some(entered) => {
                        let new_anchor = self.anchor(entered, redirect_target, reenter);
                        self.exit_until(entered, new_anchor, info, path).await?;
                        new_anchor
                    }
                    None => None,
                };

                info.target = redirect_key;
                if payload.is_some() {
                    info.payload = payload;
                }
                if let Some(action) = action {
                    action(info)?;
                }
                anchor = new_anchor;
                target = redirect_target;
                continue 'redirect;
            }
        }
    }

    fn initial_child(&self, parent: NodeId, info: &TransitionInfo) -> Result<NodeId, StateError> {
        let node = self.tree.get(parent);
        let selected = match &node.initial_child {
            Some(InitialChild::Key(key)) => key.clone(),
            Some(InitialChild::Select(select)) => select(info),
            None => {
                return Err(StateError::InvalidInitialChild {
                    parent: node.key.clone(),
                    selected: node.key.clone(),
                })
            }
        };
        self.tree
            .index_of(&selected)
            .filter(|&child| self.tree.parent(child) == Some(parent))
            .ok_or(StateError::InvalidInitialChild {
                parent: node.key.clone(),
                selected,
            })
    }

    async fn enter_node(
        &mut self,
        id: NodeId,
        info: &TransitionInfo,
        restore: &mut Option<RestorePlan>,
    ) -> Result<EnterOutcome, StateError> {
        let tree = std::sync::Arc::clone(&self.tree);
        let node = tree.get(id);
        let restored = restore.as_mut().and_then(|plan| plan.take(id));
        trace!(state = %node.key, "entering");

        let mut nested = None;
        let cell = match restored {
            Some(RestoredData::Cell(cell)) => Some(cell),
            Some(RestoredData::Machine(saved)) => {
                nested = Some(saved);
                None
            }
            None => match &node.data {
                Some(binding) => {
                    let source = InitialDataSource::new(
                        node.key.clone(),
                        info.payload.clone(),
                        self.ancestor_cells(),
                    );
                    match binding.initial(source).await? {
                        InitialCell::Cell(cell) => Some(cell),
                        InitialCell::Redirect(request) => {
                            return Ok(EnterOutcome::RedirectedBefore(request));
                        }
                    }
                }
                None => None,
            },
        };

        self.data[id] = cell;
        self.active.push(id);
        if node.kind == NodeKind::Machine {
            self.start_nested(id, info, nested).await?;
        }
        self.publish_active();

        match self
            .run_transition_handler(id, info, TransitionPhase::Enter)
            .await?
        {
            Some(request) => Ok(EnterOutcome::RedirectedAfter(request)),
            None => Ok(EnterOutcome::Entered),
        }
    }

    /// Data of the active states, nearest first.
    fn ancestor_cells(&self) -> Vec<crate::data::cell::DataCell> {
        self.active
            .iter()
            .rev()
            .filter_map(|&id| self.data[id].clone())
            .collect()
    }

    /// Commit a finished transition.
    pub(crate) fn complete(
        &mut self,
        from: Option<NodeId>,
        leaf: NodeId,
        info: &TransitionInfo,
        path: TransitionPath,
    ) -> TransitionRecord {
        self.current = Some(leaf);
        let is_final = self.tree.get(leaf).kind == NodeKind::Final;
        let record = TransitionRecord {
            from: from.map(|id| self.key(id)),
            to: self.key(leaf),
            target: info.target.clone(),
            lca: info.lca.clone(),
            exited: path.exited,
            entered: path.entered,
            is_final,
            timestamp: Utc::now(),
            payload: info.payload.clone(),
        };
        self.publish_active();
        self.shared.record_transition(&record);
        if is_final {
            self.shared.set_status(MachineStatus::Done);
            debug!(state = %record.to, "final state reached");
        }
        debug!(
            from = ?record.from,
            to = %record.to,
            exited = record.exited.len(),
            entered = record.entered.len(),
            "transition complete"
        );
        record
    }
}
