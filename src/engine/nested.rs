//! Machine states: leaves that host an independent nested machine.
//!
//! Entering a machine state creates (or attaches) the nested machine and
//! stores its [`CurrentState`] as the state's data. A watcher task follows
//! the nested machine's transitions and posts a completion message to the
//! outer queue; the two queues never merge.

use super::core::MachineCore;
use super::context::TransitionInfo;
use super::machine::{CurrentState, TreeStateMachine};
use super::mailbox::Command;
use super::request::MessageResult;
use super::result::{MachineError, MachineStatus, ProcessResult};
use super::MessageContext;
use crate::builder::NodeId;
use crate::checkpoint::NestedRestore;
use crate::core::{Message, StateError, StateKey, TransitionRecord};
use crate::data::cell::new_cell;
use crate::descriptor::{DonePredicate, InitialMachine, MachineStateSpec, TreeState};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Posted to the outer machine when a nested machine completes.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedMachineDone {
    pub state: StateKey,
    pub machine: Uuid,
}

/// Posted to the outer machine when a nested machine goes away before
/// completing.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedMachineDisposed {
    pub state: StateKey,
    pub machine: Uuid,
}

/// Behavior of every machine state.
pub(crate) struct NestedMachineState {
    spec: Arc<MachineStateSpec>,
}

impl NestedMachineState {
    pub(crate) fn new(spec: Arc<MachineStateSpec>) -> Self {
        Self { spec }
    }

    fn nested_error(key: &StateKey, reason: impl ToString) -> StateError {
        StateError::Nested {
            key: key.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl TreeState for NestedMachineState {
    async fn on_message(&mut self, ctx: &mut MessageContext<'_>) -> Result<MessageResult, StateError> {
        let inner = ctx.own_data::<CurrentState>()?.value()?;
        let inner_id = inner.machine().id();

        if let Some(done) = ctx.message_as::<NestedMachineDone>() {
            if done.machine != inner_id {
                return Ok(MessageResult::Stay);
            }
            debug!(state = %ctx.handling_key(), "nested machine done");
            return Ok(MessageResult::GoTo((self.spec.on_done)(&inner)));
        }

        if let Some(disposed) = ctx.message_as::<NestedMachineDisposed>() {
            if disposed.machine != inner_id {
                return Ok(MessageResult::Stay);
            }
            return Ok(match &self.spec.on_disposed {
                Some(on_disposed) => MessageResult::GoTo(on_disposed()),
                None => {
                    warn!(
                        state = %ctx.handling_key(),
                        "nested machine disposed before completing; staying in machine state"
                    );
                    MessageResult::Stay
                }
            });
        }

        if !self.spec.forward_messages {
            return Ok(MessageResult::Unhandled);
        }

        let key = ctx.handling_key().clone();
        match inner.machine().post_message(ctx.message().clone()).await {
            Ok(ProcessResult::Handled(_)) => Ok(MessageResult::Stay),
            Ok(ProcessResult::Unhandled(_)) => Ok(MessageResult::Unhandled),
            Ok(ProcessResult::Failed(failed)) => Err(Self::nested_error(&key, failed.error)),
            // Completion is already on its way to this machine's queue
            Err(MachineError::Done) => Ok(MessageResult::Unhandled),
            Err(error) => Err(Self::nested_error(&key, error)),
        }
    }
}

impl MachineCore {
    /// Create or attach the nested machine of machine state `id` and start
    /// watching it. `restored` resumes it from a checkpoint.
    pub(crate) async fn start_nested(
        &mut self,
        id: NodeId,
        info: &TransitionInfo,
        restored: Option<NestedRestore>,
    ) -> Result<(), StateError> {
        let key = self.key(id);
        let spec = self
            .tree
            .get(id)
            .machine
            .clone()
            .ok_or_else(|| NestedMachineState::nested_error(&key, "machine state has no machine"))?;
        let config = spec
            .config
            .clone()
            .unwrap_or_else(|| self.shared.config.clone().with_name(key.as_str()));

        let machine = match (&spec.initial, &restored) {
            (_, Some(NestedRestore::Planned { tree, .. })) => TreeStateMachine::from_tree(Arc::clone(tree), config),
            (InitialMachine::Descriptor(descriptor), _) => TreeStateMachine::with_config(descriptor(), config)
                .map_err(|e| NestedMachineState::nested_error(&key, e))?,
            (InitialMachine::Tree(tree), _) => TreeStateMachine::from_tree(Arc::clone(tree), config),
            (InitialMachine::Attach(attach), _) => attach(info),
        };

        // Subscribe before starting so no transition is missed
        let transitions = machine.transitions();
        let current = match restored {
            Some(NestedRestore::Planned { plan, .. }) => machine.resume(plan).await,
            Some(NestedRestore::Unchecked(checkpoint)) => machine.load(&checkpoint).await,
            None if machine.status() == MachineStatus::NotStarted => machine.start().await,
            None => Ok(CurrentState::new(machine.clone())),
        }
        .map_err(|e| NestedMachineState::nested_error(&key, e))?;

        self.data[id] = Some(new_cell(key.clone(), current));
        let watcher = spawn_watcher(
            self.mailbox.sender(),
            key.clone(),
            machine,
            spec.is_done.clone(),
            transitions,
        );
        self.timers.track_task(id, watcher);
        debug!(state = %key, "nested machine started");
        Ok(())
    }
}

fn spawn_watcher(
    outer: mpsc::UnboundedSender<Command>,
    state: StateKey,
    inner: TreeStateMachine,
    is_done: Option<DonePredicate>,
    mut transitions: broadcast::Receiver<TransitionRecord>,
) -> tokio::task::AbortHandle {
    let machine = inner.id();
    let post = move |message: Message| {
        let _ = outer.send(Command::Post {
            message,
            reply: None,
        });
    };
    let done = {
        let state = state.clone();
        move || {
            Message::new(NestedMachineDone {
                state: state.clone(),
                machine,
            })
        }
    };

    let task = tokio::spawn(async move {
        if is_done.is_none() && inner.is_done() {
            post(done());
            return;
        }
        loop {
            match transitions.recv().await {
                Ok(record) => {
                    let finished = match &is_done {
                        Some(predicate) => predicate(&record),
                        None => record.is_final,
                    };
                    if finished {
                        post(done());
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(state = %state, missed, "nested machine watcher lagged");
                    if is_done.is_none() && inner.is_done() {
                        post(done());
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    if is_done.is_none() && inner.is_done() {
                        post(done());
                    } else {
                        post(Message::new(NestedMachineDisposed { state, machine }));
                    }
                    return;
                }
            }
        }
    });
    task.abort_handle()
}
