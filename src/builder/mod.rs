//! Validation and flattening of state tree descriptions.
//!
//! [`RuntimeTree::build`] turns a [`NodeDescriptor`](crate::descriptor::NodeDescriptor)
//! into an immutable, indexed tree. Structural rules are checked with
//! accumulating validation so every violation is reported together.

pub mod error;
pub mod macros;
mod tree;
mod validate;

pub use error::{BuildError, TreeViolation};
pub use tree::{NodeInfo, RuntimeTree};

pub(crate) use tree::NodeId;
