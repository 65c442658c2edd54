//! Runtime for tree state machines.
//!
//! A started machine is owned by a single task that processes commands one
//! at a time: starting, messages, timer deliveries, saves and stops. The
//! [`TreeStateMachine`] handle and [`CurrentState`] talk to that task
//! through its queue.

mod context;
mod core;
mod dispatch;
mod mailbox;
mod machine;
pub(crate) mod nested;
mod persist;
mod request;
mod result;
mod scheduler;
mod shared;
mod transition;

pub use context::{MessageContext, TransitionContext, TransitionInfo, TransitionPhase};
pub use machine::{CurrentState, TreeStateMachine};
pub use nested::{NestedMachineDisposed, NestedMachineDone};
pub use request::{MessageResult, TransitionAction, TransitionRequest};
pub use result::{
    FailedMessage, HandledMessage, MachineError, MachineStatus, ProcessResult, UnhandledMessage,
};
pub use scheduler::{TimerHandle, TimerId};
