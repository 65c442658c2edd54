//! Declarative state tree descriptions.
//!
//! A [`NodeDescriptor`] describes a node, its behavior, its optional data
//! and its children. Descriptors are validated and flattened into a
//! [`RuntimeTree`](crate::builder::RuntimeTree) before any machine runs.

mod behavior;
mod channel;
mod data;
mod filter;
mod machine;
mod node;

pub use behavior::{EmptyState, StateBehavior, StateFactory, TreeState};
pub use channel::Channel;
pub use data::{DataCodec, InitialData, InitialDataSource, InitialValue};
pub use filter::{NextMessage, NextTransition, TreeStateFilter};
pub use machine::{InitialMachine, MachineStateSpec};
pub use node::{InitialChild, NodeDescriptor, NodeKind};

pub(crate) use data::{DataBinding, InitialCell};
pub(crate) use machine::DonePredicate;
