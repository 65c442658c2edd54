//! Declarations for states that host a nested state machine.

use super::NodeDescriptor;
use crate::builder::RuntimeTree;
use crate::config::MachineConfig;
use crate::core::TransitionRecord;
use crate::engine::{CurrentState, TransitionInfo, TransitionRequest, TreeStateMachine};
use std::fmt;
use std::sync::Arc;

type DescriptorFn = Arc<dyn Fn() -> NodeDescriptor + Send + Sync>;
type AttachFn = Arc<dyn Fn(&TransitionInfo) -> TreeStateMachine + Send + Sync>;
pub(crate) type DonePredicate = Arc<dyn Fn(&TransitionRecord) -> bool + Send + Sync>;
type DoneFn = Arc<dyn Fn(&CurrentState) -> TransitionRequest + Send + Sync>;
type DisposedFn = Arc<dyn Fn() -> TransitionRequest + Send + Sync>;

/// How the nested machine is obtained each time its state is entered.
#[derive(Clone)]
pub enum InitialMachine {
    /// Build a fresh machine from a descriptor
    Descriptor(DescriptorFn),

    /// Run a fresh machine over an already-built tree
    Tree(Arc<RuntimeTree>),

    /// Attach an existing machine, starting it if it has not been started
    Attach(AttachFn),
}

impl InitialMachine {
    pub fn from_descriptor<F>(f: F) -> Self
    where
        F: Fn() -> NodeDescriptor + Send + Sync + 'static,
    {
        InitialMachine::Descriptor(Arc::new(f))
    }

    pub fn from_tree(tree: Arc<RuntimeTree>) -> Self {
        InitialMachine::Tree(tree)
    }

    pub fn from_machine<F>(f: F) -> Self
    where
        F: Fn(&TransitionInfo) -> TreeStateMachine + Send + Sync + 'static,
    {
        InitialMachine::Attach(Arc::new(f))
    }
}

impl fmt::Debug for InitialMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitialMachine::Descriptor(_) => f.write_str("InitialMachine::Descriptor"),
            InitialMachine::Tree(tree) => write!(f, "InitialMachine::Tree({})", tree.root_key()),
            InitialMachine::Attach(_) => f.write_str("InitialMachine::Attach"),
        }
    }
}

/// Behavior of a machine state.
///
/// While the state is active, messages it receives are forwarded to the
/// nested machine. When the nested machine finishes, `on_done` picks the
/// transition the outer machine takes.
///
/// # Example
///
/// ```rust
/// use treestate::descriptor::{InitialMachine, MachineStateSpec, NodeDescriptor};
/// use treestate::engine::TransitionRequest;
///
/// let checkout = MachineStateSpec::new(
///     InitialMachine::from_descriptor(|| {
///         NodeDescriptor::root("checkout")
///             .child(NodeDescriptor::leaf("cart"))
///             .child(NodeDescriptor::final_leaf("paid"))
///             .initial("cart")
///     }),
///     |_inner| TransitionRequest::new("shipping"),
/// );
/// let node = NodeDescriptor::machine("checking_out", checkout);
/// ```
pub struct MachineStateSpec {
    pub(crate) initial: InitialMachine,
    pub(crate) config: Option<MachineConfig>,
    pub(crate) is_done: Option<DonePredicate>,
    pub(crate) on_done: DoneFn,
    pub(crate) on_disposed: Option<DisposedFn>,
    pub(crate) forward_messages: bool,
    pub(crate) dispose_on_exit: bool,
}

impl MachineStateSpec {
    pub fn new<F>(initial: InitialMachine, on_done: F) -> Self
    where
        F: Fn(&CurrentState) -> TransitionRequest + Send + Sync + 'static,
    {
        Self {
            initial,
            config: None,
            is_done: None,
            on_done: Arc::new(on_done),
            on_disposed: None,
            forward_messages: true,
            dispose_on_exit: true,
        }
    }

    /// Treat the nested machine as done when `f` accepts one of its
    /// transitions. Without a predicate the machine is done when it
    /// reaches a final state.
    pub fn is_done<F>(mut self, f: F) -> Self
    where
        F: Fn(&TransitionRecord) -> bool + Send + Sync + 'static,
    {
        self.is_done = Some(Arc::new(f));
        self
    }

    /// Transition taken when the nested machine is disposed before it is
    /// done. Without it the outer state stays put and a warning is logged.
    pub fn on_disposed<F>(mut self, f: F) -> Self
    where
        F: Fn() -> TransitionRequest + Send + Sync + 'static,
    {
        self.on_disposed = Some(Arc::new(f));
        self
    }

    pub fn forward_messages(mut self, forward: bool) -> Self {
        self.forward_messages = forward;
        self
    }

    /// Whether exiting the machine state disposes the nested machine.
    /// Attached machines usually want `false`.
    pub fn dispose_on_exit(mut self, dispose: bool) -> Self {
        self.dispose_on_exit = dispose;
        self
    }

    /// Configuration for machines created by this state.
    pub fn config(mut self, config: MachineConfig) -> Self {
        self.config = Some(config);
        self
    }
}

impl fmt::Debug for MachineStateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineStateSpec")
            .field("initial", &self.initial)
            .field("custom_done", &self.is_done.is_some())
            .field("forward_messages", &self.forward_messages)
            .field("dispose_on_exit", &self.dispose_on_exit)
            .finish()
    }
}
