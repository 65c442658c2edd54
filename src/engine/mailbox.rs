//! Commands accepted by a machine's task.

use super::result::{MachineError, ProcessResult};
use super::scheduler::TimerId;
use crate::checkpoint::{Checkpoint, PersistenceError, RestorePlan};
use crate::core::{Message, StateKey};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

pub(crate) enum StartMode {
    /// Enter the root, or the given state, through initial children
    Fresh(Option<StateKey>),
    Restore(RestorePlan),
}

pub(crate) enum Command {
    Start {
        mode: StartMode,
        reply: oneshot::Sender<Result<StateKey, MachineError>>,
    },
    Post {
        message: Message,
        reply: Option<oneshot::Sender<Result<ProcessResult, MachineError>>>,
    },
    Timer {
        timer: TimerId,
        message: Message,
    },
    Save {
        reply: oneshot::Sender<Result<Checkpoint, PersistenceError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<(), MachineError>>,
    },
    Dispose,
}

/// Sending half of a machine's command queue, as seen from inside the
/// machine.
pub(crate) struct Mailbox {
    commands: mpsc::UnboundedSender<Command>,
    next_timer: AtomicU64,
}

impl Mailbox {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            next_timer: AtomicU64::new(1),
        }
    }

    /// Queue `message` behind everything already queued.
    pub(crate) fn post(&self, message: Message) -> bool {
        self.commands
            .send(Command::Post {
                message,
                reply: None,
            })
            .is_ok()
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Command> {
        self.commands.clone()
    }

    pub(crate) fn next_timer_id(&self) -> TimerId {
        TimerId(self.next_timer.fetch_add(1, Ordering::Relaxed))
    }
}
