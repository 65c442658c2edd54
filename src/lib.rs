//! Treestate: hierarchical state machines with typed state data.
//!
//! A machine is declared as a tree of [`NodeDescriptor`]s, validated once
//! into a [`RuntimeTree`], and then run by a [`TreeStateMachine`]. Messages
//! are offered to the current leaf first and bubble toward the root until
//! some state handles them. Transitions exit and enter states in tree order
//! around their least common ancestor.
//!
//! # Core Concepts
//!
//! - **States**: Behaviors implementing [`TreeState`], or closures collected
//!   in a [`StateBehavior`]
//! - **Data states**: States owning a typed [`DataValue`] for as long as
//!   they are active
//! - **Machine states**: Leaves hosting an independent nested machine
//! - **Filters**: Interceptors wrapped around a state's handlers
//! - **Checkpoints**: Saved active paths that a fresh machine can resume
//!
//! # Example
//!
//! ```rust
//! use treestate::{NodeDescriptor, StateBehavior, StateError, TreeStateMachine};
//!
//! struct Coin;
//! struct Push;
//!
//! let locked = StateBehavior::new().on_message(|ctx| {
//!     if ctx.message_as::<Coin>().is_some() {
//!         return Ok(ctx.go_to("unlocked"));
//!     }
//!     Ok(ctx.unhandled())
//! });
//! let unlocked = StateBehavior::new().on_message(|ctx| {
//!     if ctx.message_as::<Push>().is_some() {
//!         return Ok(ctx.go_to("locked"));
//!     }
//!     Ok(ctx.unhandled())
//! });
//!
//! let root = NodeDescriptor::root("turnstile")
//!     .initial("locked")
//!     .child(NodeDescriptor::leaf("locked").behavior(locked))
//!     .child(NodeDescriptor::leaf("unlocked").behavior(unlocked));
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()
//!     .unwrap();
//! runtime.block_on(async {
//!     let machine = TreeStateMachine::new(root).unwrap();
//!     let current = machine.start().await.unwrap();
//!
//!     current.post(Coin).await.unwrap();
//!     assert_eq!(current.key(), "unlocked");
//!
//!     let result = current.post(Coin).await.unwrap();
//!     assert!(result.is_unhandled());
//!
//!     current.post(Push).await.unwrap();
//!     assert_eq!(current.key(), "locked");
//!     Ok::<(), StateError>(())
//! })
//! .unwrap();
//! ```

pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod data;
pub mod descriptor;
pub mod engine;

// Re-export commonly used types
pub use builder::{BuildError, NodeInfo, RuntimeTree, TreeViolation};
pub use checkpoint::{Checkpoint, PersistenceError, SavedNode};
pub use config::{FailurePolicy, MachineConfig};
pub use self::core::{DataStateKey, Message, Payload, StateError, StateKey, TransitionHistory, TransitionRecord};
pub use data::{DataError, DataSubscription, DataValue, DataView, StateData};
pub use descriptor::{
    Channel, DataCodec, EmptyState, InitialChild, InitialData, InitialDataSource, InitialMachine,
    InitialValue, MachineStateSpec, NextMessage, NextTransition, NodeDescriptor, NodeKind,
    StateBehavior, TreeState, TreeStateFilter,
};
pub use engine::{
    CurrentState, FailedMessage, HandledMessage, MachineError, MachineStatus, MessageContext,
    MessageResult, NestedMachineDisposed, NestedMachineDone, ProcessResult, TimerHandle, TimerId,
    TransitionContext, TransitionInfo, TransitionPhase, TransitionRequest, TreeStateMachine,
    UnhandledMessage,
};
