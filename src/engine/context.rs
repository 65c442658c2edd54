//! Contexts handed to state handlers.

use super::mailbox::Mailbox;
use super::request::{MessageResult, TransitionRequest};
use super::scheduler::{spawn_timer, TimerEntry, TimerHandle};
use crate::builder::{NodeId, RuntimeTree};
use crate::core::{DataStateKey, Message, Payload, StateError, StateKey};
use crate::data::cell::{downcast_cell, is_cell_of, DataCell};
use crate::data::{DataError, DataValue, StateData};
use crate::descriptor::Channel;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Describes the transition in progress.
#[derive(Debug, Clone)]
pub struct TransitionInfo {
    pub(crate) from: Option<StateKey>,
    pub(crate) target: StateKey,
    pub(crate) lca: Option<StateKey>,
    pub(crate) payload: Option<Payload>,
}

impl TransitionInfo {
    /// Leaf that was current when the transition began; `None` while the
    /// machine is starting.
    pub fn from_key(&self) -> Option<&StateKey> {
        self.from.as_ref()
    }

    /// Requested target. Redirects replace it.
    pub fn target_key(&self) -> &StateKey {
        &self.target
    }

    /// Least common ancestor of the source and target, or `None` when the
    /// root itself is exited.
    pub fn lca_key(&self) -> Option<&StateKey> {
        self.lca.as_ref()
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn payload_as<P: Any>(&self) -> Option<&P> {
        self.payload.as_ref()?.downcast_ref()
    }
}

/// Whether a transition handler runs on entry or on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    Enter,
    Exit,
}

/// Side effects requested by a handler, applied once it returns.
#[derive(Default)]
pub(crate) struct Effects {
    pub(crate) timers: Vec<TimerEntry>,
    pub(crate) redirect: Option<TransitionRequest>,
}

/// What every handler can see: the tree, active data and the queue.
pub(crate) struct Scope<'a> {
    pub(crate) tree: &'a RuntimeTree,
    pub(crate) data: &'a [Option<DataCell>],
    pub(crate) node: NodeId,
    pub(crate) mailbox: &'a Mailbox,
    pub(crate) effects: &'a mut Effects,
}

impl Scope<'_> {
    fn handling_key(&self) -> &StateKey {
        self.tree.key(self.node)
    }

    fn data<D: StateData>(&self, key: &StateKey) -> Result<Arc<DataValue<D>>, DataError> {
        let id = self
            .tree
            .index_of(key)
            .ok_or_else(|| DataError::NotActive { key: key.clone() })?;
        let node = self.tree.get(id);
        if node.data.is_none() && node.machine.is_none() {
            return Err(DataError::NoData { key: key.clone() });
        }
        let cell = self.data[id]
            .as_ref()
            .ok_or_else(|| DataError::NotActive { key: key.clone() })?;
        downcast_cell(cell)
    }

    fn data_of_type<D: StateData>(&self) -> Result<Arc<DataValue<D>>, DataError> {
        let mut node = Some(self.node);
        while let Some(id) = node {
            if let Some(cell) = self.data[id].as_ref().filter(|cell| is_cell_of::<D>(cell)) {
                return downcast_cell(cell);
            }
            node = self.tree.parent(id);
        }
        Err(DataError::NotFound {
            expected: std::any::type_name::<D>(),
        })
    }

    fn post(&self, message: Message) {
        if !self.mailbox.post(message) {
            warn!(state = %self.handling_key(), "message posted after machine shut down");
        }
    }

    fn schedule<F>(&mut self, message: F, delay: Duration, periodic: bool) -> TimerHandle
    where
        F: Fn() -> Message + Send + Sync + 'static,
    {
        let (handle, entry) = spawn_timer(self.mailbox, self.node, Arc::new(message), delay, periodic);
        self.effects.timers.push(entry);
        handle
    }
}

/// Context for `on_enter` and `on_exit` handlers.
pub struct TransitionContext<'a> {
    scope: Scope<'a>,
    info: &'a TransitionInfo,
    phase: TransitionPhase,
}

impl<'a> TransitionContext<'a> {
    pub(crate) fn new(scope: Scope<'a>, info: &'a TransitionInfo, phase: TransitionPhase) -> Self {
        Self { scope, info, phase }
    }

    pub fn info(&self) -> &TransitionInfo {
        self.info
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phase
    }

    pub fn from_key(&self) -> Option<&StateKey> {
        self.info.from_key()
    }

    pub fn target_key(&self) -> &StateKey {
        self.info.target_key()
    }

    pub fn lca_key(&self) -> Option<&StateKey> {
        self.info.lca_key()
    }

    /// State whose handler is running.
    pub fn handling_key(&self) -> &StateKey {
        self.scope.handling_key()
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.info.payload()
    }

    pub fn payload_as<P: Any>(&self) -> Option<&P> {
        self.info.payload_as()
    }

    /// Payload carried through `channel`; an error when it is missing.
    pub fn channel_payload<P: Any + Send + Sync>(&self, channel: &Channel<P>) -> Result<&P, StateError> {
        channel.extract(self.handling_key(), self.info.payload())
    }

    /// Data of an active state.
    pub fn data<D: StateData>(&self, key: &DataStateKey<D>) -> Result<Arc<DataValue<D>>, DataError> {
        self.scope.data(key.key())
    }

    /// Data of the nearest active state carrying a `D`, starting with the
    /// handling state itself.
    pub fn data_of_type<D: StateData>(&self) -> Result<Arc<DataValue<D>>, DataError> {
        self.scope.data_of_type()
    }

    /// Queue a message for this machine. It is processed after the current
    /// message completes.
    pub fn post<T: Any + Send + Sync>(&self, message: T) {
        self.scope.post(Message::new(message));
    }

    pub fn post_message(&self, message: Message) {
        self.scope.post(message);
    }

    /// Deliver `message()` after `delay`. Cancelled when the handling state
    /// exits.
    pub fn schedule<F>(&mut self, message: F, delay: Duration) -> TimerHandle
    where
        F: Fn() -> Message + Send + Sync + 'static,
    {
        self.scope.schedule(message, delay, false)
    }

    /// Deliver `message()` every `period` until the handling state exits.
    pub fn schedule_periodic<F>(&mut self, message: F, period: Duration) -> TimerHandle
    where
        F: Fn() -> Message + Send + Sync + 'static,
    {
        self.scope.schedule(message, period, true)
    }

    /// Abandon the current entry and transition to `target` instead.
    /// Only honored while entering.
    pub fn redirect_to(&mut self, target: impl Into<StateKey>) {
        self.redirect(TransitionRequest::new(target));
    }

    pub fn redirect(&mut self, request: TransitionRequest) {
        if self.phase == TransitionPhase::Exit {
            warn!(
                state = %self.handling_key(),
                target = %request.target,
                "ignoring redirect requested during exit"
            );
            return;
        }
        self.scope.effects.redirect = Some(request);
    }
}

/// Context for `on_message` handlers.
pub struct MessageContext<'a> {
    scope: Scope<'a>,
    message: &'a Message,
    receiving: NodeId,
}

impl<'a> MessageContext<'a> {
    pub(crate) fn new(scope: Scope<'a>, message: &'a Message, receiving: NodeId) -> Self {
        Self {
            scope,
            message,
            receiving,
        }
    }

    pub fn message(&self) -> &Message {
        self.message
    }

    pub fn message_as<T: Any>(&self) -> Option<&T> {
        self.message.downcast_ref()
    }

    /// Current leaf, which received the message first.
    pub fn receiving_key(&self) -> &StateKey {
        self.scope.tree.key(self.receiving)
    }

    /// State whose handler is running.
    pub fn handling_key(&self) -> &StateKey {
        self.scope.handling_key()
    }

    pub fn data<D: StateData>(&self, key: &DataStateKey<D>) -> Result<Arc<DataValue<D>>, DataError> {
        self.scope.data(key.key())
    }

    pub fn data_of_type<D: StateData>(&self) -> Result<Arc<DataValue<D>>, DataError> {
        self.scope.data_of_type()
    }

    /// Data of the handling state.
    pub fn own_data<D: StateData>(&self) -> Result<Arc<DataValue<D>>, DataError> {
        self.scope.data(self.handling_key())
    }

    pub fn post<T: Any + Send + Sync>(&self, message: T) {
        self.scope.post(Message::new(message));
    }

    pub fn post_message(&self, message: Message) {
        self.scope.post(message);
    }

    pub fn schedule<F>(&mut self, message: F, delay: Duration) -> TimerHandle
    where
        F: Fn() -> Message + Send + Sync + 'static,
    {
        self.scope.schedule(message, delay, false)
    }

    pub fn schedule_periodic<F>(&mut self, message: F, period: Duration) -> TimerHandle
    where
        F: Fn() -> Message + Send + Sync + 'static,
    {
        self.scope.schedule(message, period, true)
    }

    pub fn go_to(&self, target: impl Into<StateKey>) -> MessageResult {
        MessageResult::go_to(target)
    }

    pub fn go_to_with<P: Any + Send + Sync>(&self, target: impl Into<StateKey>, payload: P) -> MessageResult {
        MessageResult::GoTo(TransitionRequest::new(target).with_payload(payload))
    }

    pub fn stay(&self) -> MessageResult {
        MessageResult::Stay
    }

    pub fn unhandled(&self) -> MessageResult {
        MessageResult::Unhandled
    }
}
