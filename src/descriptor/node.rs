//! Declarative description of a state tree.

use super::behavior::{factory_of, StateFactory};
use super::data::{DataBinding, DataCodec, InitialData, TypedBinding};
use super::{MachineStateSpec, StateBehavior, TreeState, TreeStateFilter};
use crate::core::StateKey;
use crate::data::StateData;
use crate::engine::TransitionInfo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Role of a node in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Interior,
    Leaf,
    Final,
    Machine,
}

impl NodeKind {
    /// Root and interior nodes have children; everything else is a leaf.
    pub fn is_composite(self) -> bool {
        matches!(self, NodeKind::Root | NodeKind::Interior)
    }

    pub fn is_leaf(self) -> bool {
        !self.is_composite()
    }
}

/// Which child a composite state enters when it is entered as part of a
/// transition that targets it (or one of its ancestors).
#[derive(Clone)]
pub enum InitialChild {
    Key(StateKey),
    Select(Arc<dyn Fn(&TransitionInfo) -> StateKey + Send + Sync>),
}

impl fmt::Debug for InitialChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitialChild::Key(key) => write!(f, "InitialChild::Key({key})"),
            InitialChild::Select(_) => f.write_str("InitialChild::Select"),
        }
    }
}

/// One node of a state tree, together with its subtree.
///
/// # Example
///
/// ```rust
/// use treestate::descriptor::NodeDescriptor;
///
/// let tree = NodeDescriptor::root("door")
///     .child(NodeDescriptor::leaf("closed"))
///     .child(NodeDescriptor::leaf("open"))
///     .initial("closed");
/// assert_eq!(tree.key().as_str(), "door");
/// ```
pub struct NodeDescriptor {
    pub(crate) key: StateKey,
    pub(crate) kind: NodeKind,
    pub(crate) behavior: Option<StateFactory>,
    pub(crate) data: Option<Arc<dyn DataBinding>>,
    pub(crate) filters: Vec<Arc<dyn TreeStateFilter>>,
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
    pub(crate) children: Vec<NodeDescriptor>,
    pub(crate) initial_child: Option<InitialChild>,
    pub(crate) declared_parent: Option<StateKey>,
    pub(crate) declared_targets: Vec<StateKey>,
    pub(crate) machine: Option<Arc<MachineStateSpec>>,
}

impl NodeDescriptor {
    fn new(key: impl Into<StateKey>, kind: NodeKind) -> Self {
        Self {
            key: key.into(),
            kind,
            behavior: None,
            data: None,
            filters: Vec::new(),
            metadata: BTreeMap::new(),
            children: Vec::new(),
            initial_child: None,
            declared_parent: None,
            declared_targets: Vec::new(),
            machine: None,
        }
    }

    pub fn root(key: impl Into<StateKey>) -> Self {
        Self::new(key, NodeKind::Root)
    }

    pub fn interior(key: impl Into<StateKey>) -> Self {
        Self::new(key, NodeKind::Interior)
    }

    pub fn leaf(key: impl Into<StateKey>) -> Self {
        Self::new(key, NodeKind::Leaf)
    }

    /// A leaf that completes the machine when entered.
    pub fn final_leaf(key: impl Into<StateKey>) -> Self {
        Self::new(key, NodeKind::Final)
    }

    /// A leaf that runs a nested machine while active.
    pub fn machine(key: impl Into<StateKey>, spec: MachineStateSpec) -> Self {
        let mut node = Self::new(key, NodeKind::Machine);
        node.machine = Some(Arc::new(spec));
        node
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn children(&self) -> &[NodeDescriptor] {
        &self.children
    }

    pub fn child(mut self, child: NodeDescriptor) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = NodeDescriptor>) -> Self {
        self.children.extend(children);
        self
    }

    /// Fixed initial child.
    pub fn initial(mut self, child: impl Into<StateKey>) -> Self {
        self.initial_child = Some(InitialChild::Key(child.into()));
        self
    }

    /// Initial child chosen per transition.
    pub fn initial_with<F>(mut self, select: F) -> Self
    where
        F: Fn(&TransitionInfo) -> StateKey + Send + Sync + 'static,
    {
        self.initial_child = Some(InitialChild::Select(Arc::new(select)));
        self
    }

    /// Behavior created by `factory` on every entry.
    pub fn state<S, F>(mut self, factory: F) -> Self
    where
        S: TreeState + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.behavior = Some(factory_of(factory));
        self
    }

    pub fn behavior(mut self, behavior: StateBehavior) -> Self {
        self.behavior = Some(behavior.into_factory());
        self
    }

    /// Attach data that is not saved in checkpoints.
    pub fn data<D: StateData>(mut self, initial: InitialData<D>) -> Self {
        self.data = Some(Arc::new(TypedBinding::new(initial, None)));
        self
    }

    /// Attach data saved in checkpoints through its serde implementation.
    pub fn json_data<D>(self, initial: InitialData<D>) -> Self
    where
        D: StateData + Serialize + DeserializeOwned,
    {
        self.data_with_codec(initial, DataCodec::json())
    }

    pub fn data_with_codec<D: StateData>(mut self, initial: InitialData<D>, codec: DataCodec<D>) -> Self {
        self.data = Some(Arc::new(TypedBinding::new(initial, Some(codec))));
        self
    }

    pub fn filter(mut self, filter: impl TreeStateFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Declare the parent this node expects. Checked when the tree is
    /// built.
    pub fn parent(mut self, parent: impl Into<StateKey>) -> Self {
        self.declared_parent = Some(parent.into());
        self
    }

    /// Declare states this node may transition to. Checked when the tree
    /// is built.
    pub fn targets<K: Into<StateKey>>(mut self, targets: impl IntoIterator<Item = K>) -> Self {
        self.declared_targets.extend(targets.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("data", &self.data.as_ref().map(|d| d.type_name()))
            .field("initial_child", &self.initial_child)
            .field("children", &self.children)
            .finish()
    }
}
