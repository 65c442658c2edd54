//! The task that owns a running machine.
//!
//! All behaviors, data and timers of a machine live in its [`MachineCore`],
//! which processes one command at a time from its queue. Handles talk to it
//! only through that queue and the published [`MachineShared`] snapshot.

use super::context::{Effects, MessageContext, Scope, TransitionContext, TransitionInfo, TransitionPhase};
use super::mailbox::{Command, Mailbox, StartMode};
use super::request::{MessageResult, TransitionRequest};
use super::result::{MachineError, MachineStatus, ProcessResult};
use super::scheduler::TimerRegistry;
use super::shared::MachineShared;
use super::machine::CurrentState;
use crate::builder::{NodeId, RuntimeTree};
use crate::core::{Message, StateError, StateKey};
use crate::data::cell::{downcast_cell, DataCell};
use crate::descriptor::{NextMessage, NextTransition, TreeState};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub(crate) struct MachineCore {
    pub(crate) shared: Arc<MachineShared>,
    pub(crate) tree: Arc<RuntimeTree>,
    pub(crate) mailbox: Mailbox,
    pub(crate) behaviors: Vec<Option<Box<dyn TreeState>>>,
    pub(crate) data: Vec<Option<DataCell>>,
    /// Entered states, root first
    pub(crate) active: Vec<NodeId>,
    pub(crate) current: Option<NodeId>,
    pub(crate) timers: TimerRegistry,
}

impl MachineCore {
    pub(crate) fn new(shared: Arc<MachineShared>, commands: mpsc::UnboundedSender<Command>) -> Self {
        let tree = Arc::clone(&shared.tree);
        let len = tree.len();
        Self {
            shared,
            tree,
            mailbox: Mailbox::new(commands),
            behaviors: (0..len).map(|_| None).collect(),
            data: vec![None; len],
            active: Vec::new(),
            current: None,
            timers: TimerRegistry::default(),
        }
    }

    pub(crate) fn status(&self) -> MachineStatus {
        self.shared.status()
    }

    pub(crate) fn key(&self, id: NodeId) -> StateKey {
        self.tree.key(id).clone()
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("machine task started");
        while let Some(command) = commands.recv().await {
            match command {
                Command::Start { mode, reply } => {
                    let started = self.start(mode).await;
                    let _ = reply.send(started);
                }
                Command::Post { message, reply } => {
                    let outcome = match MachineError::not_running(self.status()) {
                        None => Ok(self.process(message).await),
                        Some(error) => Err(error),
                    };
                    match reply {
                        Some(reply) => {
                            let _ = reply.send(outcome);
                        }
                        None => {
                            if let Err(error) = outcome {
                                debug!(%error, "dropping queued message");
                            }
                        }
                    }
                }
                Command::Timer { timer, message } => {
                    if self.timers.accept_delivery(timer) && self.status() == MachineStatus::Running {
                        self.process(message).await;
                    }
                }
                Command::Save { reply } => {
                    let saved = self.save().await;
                    let _ = reply.send(saved);
                }
                Command::Stop { reply } => {
                    let stopped = self.stop().await;
                    let _ = reply.send(stopped);
                }
                Command::Dispose => break,
            }
            if self.status() == MachineStatus::Disposed {
                break;
            }
        }
        self.dispose();
        debug!("machine task finished");
    }

    async fn start(&mut self, mode: StartMode) -> Result<StateKey, MachineError> {
        if self.status() != MachineStatus::NotStarted {
            return Err(MachineError::AlreadyStarted);
        }
        let (target, mut restore) = match mode {
            StartMode::Fresh(None) => (self.tree.root(), None),
            StartMode::Fresh(Some(key)) => {
                let id = self
                    .tree
                    .index_of(&key)
                    .ok_or(MachineError::Start(StateError::UnknownState { key }))?;
                (id, None)
            }
            StartMode::Restore(plan) => (plan.leaf, Some(plan)),
        };

        let mut info = TransitionInfo {
            from: None,
            target: self.key(target),
            lca: None,
            payload: None,
        };
        let mut path = super::transition::TransitionPath::default();
        match self.enter_toward(None, target, &mut info, &mut path, &mut restore).await {
            Ok(leaf) => {
                self.shared.set_status(MachineStatus::Running);
                let record = self.complete(None, leaf, &info, path);
                info!(state = %record.to, "machine started");
                Ok(record.to)
            }
            Err(error) => {
                warn!(%error, "machine failed to start");
                self.dispose();
                Err(MachineError::Start(error))
            }
        }
    }

    /// Dispatch `message` and publish the outcome.
    pub(crate) async fn process(&mut self, message: Message) -> ProcessResult {
        let result = self.dispatch(message).await;
        match &result {
            ProcessResult::Handled(handled) => debug!(
                message = handled.message.type_name(),
                handling = %handled.handling,
                "message handled"
            ),
            ProcessResult::Unhandled(unhandled) => debug!(
                message = unhandled.message.type_name(),
                receiving = %unhandled.receiving,
                "message unhandled"
            ),
            ProcessResult::Failed(failed) => warn!(
                message = failed.message.type_name(),
                receiving = %failed.receiving,
                error = %failed.error,
                "message handling failed"
            ),
        }
        self.shared.record_result(&result);
        result
    }

    /// Run exit handlers from the current leaf up to and including the
    /// root, then shut down.
    async fn stop(&mut self) -> Result<(), MachineError> {
        match self.status() {
            MachineStatus::Running | MachineStatus::Done => {}
            status => return Err(MachineError::not_running(status).unwrap_or(MachineError::NotStarted)),
        }
        if let Some(&deepest) = self.active.last() {
            let info = TransitionInfo {
                from: self.current.map(|id| self.key(id)),
                target: self.key(self.tree.root()),
                lca: None,
                payload: None,
            };
            let mut path = super::transition::TransitionPath::default();
            self.exit_until(deepest, None, &info, &mut path)
                .await
                .map_err(MachineError::Stop)?;
        }
        self.timers.release_all();
        self.shared.set_status(MachineStatus::Stopped);
        self.publish_active();
        self.shared.close_events();
        info!("machine stopped");
        Ok(())
    }

    /// Shut down without running exit handlers.
    pub(crate) fn dispose(&mut self) {
        if self.status() == MachineStatus::Disposed && self.active.is_empty() {
            return;
        }
        self.timers.release_all();
        while let Some(id) = self.active.pop() {
            self.release_node(id);
        }
        if self.status() != MachineStatus::Stopped {
            self.shared.set_status(MachineStatus::Disposed);
        }
        self.publish_active();
        self.shared.close_events();
        debug!("machine disposed");
    }

    /// Free everything owned by an exited node. The caller removes it from
    /// the active path.
    pub(crate) fn release_node(&mut self, id: NodeId) {
        self.timers.release(id);
        if let Some(cell) = self.data[id].take() {
            if let Some(spec) = &self.tree.get(id).machine {
                if spec.dispose_on_exit {
                    if let Ok(inner) = downcast_cell::<CurrentState>(&cell).and_then(|v| v.value()) {
                        inner.machine().dispose();
                    }
                }
            }
            cell.close();
        }
        self.behaviors[id] = None;
    }

    pub(crate) fn publish_active(&self) {
        let states = self
            .active
            .iter()
            .map(|&id| (self.key(id), self.data[id].clone()))
            .collect();
        self.shared
            .publish_active(states, self.current.map(|id| self.key(id)));
    }

    fn scope<'a>(
        tree: &'a RuntimeTree,
        data: &'a [Option<DataCell>],
        node: NodeId,
        mailbox: &'a Mailbox,
        effects: &'a mut Effects,
    ) -> Scope<'a> {
        Scope {
            tree,
            data,
            node,
            mailbox,
            effects,
        }
    }

    /// Run the enter or exit chain of `id`. Returns the redirect requested
    /// by an enter handler, if any.
    pub(crate) async fn run_transition_handler(
        &mut self,
        id: NodeId,
        info: &TransitionInfo,
        phase: TransitionPhase,
    ) -> Result<Option<TransitionRequest>, StateError> {
        let tree = Arc::clone(&self.tree);
        let node = tree.get(id);
        let behavior = self.behaviors[id].get_or_insert_with(|| node.create_behavior());
        let mut effects = Effects::default();
        let result = {
            let scope = Self::scope(&tree, &self.data, id, &self.mailbox, &mut effects);
            let mut ctx = TransitionContext::new(scope, info, phase);
            NextTransition::new(&node.filters, behavior.as_mut(), phase)
                .run(&mut ctx)
                .await
        };
        self.timers.adopt(effects.timers);
        result.map(|()| effects.redirect)
    }

    pub(crate) async fn run_message_handler(
        &mut self,
        id: NodeId,
        receiving: NodeId,
        message: &Message,
    ) -> Result<MessageResult, StateError> {
        let tree = Arc::clone(&self.tree);
        let node = tree.get(id);
        let behavior = self.behaviors[id].get_or_insert_with(|| node.create_behavior());
        let mut effects = Effects::default();
        let result = {
            let scope = Self::scope(&tree, &self.data, id, &self.mailbox, &mut effects);
            let mut ctx = MessageContext::new(scope, message, receiving);
            NextMessage::new(&node.filters, behavior.as_mut())
                .run(&mut ctx)
                .await
        };
        self.timers.adopt(effects.timers);
        result
    }
}
