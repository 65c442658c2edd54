//! The validated, flattened form of a state tree.

use super::validate::validate;
use super::BuildError;
use crate::core::StateKey;
use crate::descriptor::{
    DataBinding, EmptyState, InitialChild, MachineStateSpec, NodeDescriptor, NodeKind, StateFactory,
    TreeState, TreeStateFilter,
};
use crate::engine::nested::NestedMachineState;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use stillwater::validation::Validation;

pub(crate) type NodeId = usize;

pub(crate) struct TreeNode {
    pub(crate) key: StateKey,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) depth: usize,
    pub(crate) initial_child: Option<InitialChild>,
    pub(crate) behavior: Option<StateFactory>,
    pub(crate) data: Option<Arc<dyn DataBinding>>,
    pub(crate) filters: Vec<Arc<dyn TreeStateFilter>>,
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
    pub(crate) machine: Option<Arc<MachineStateSpec>>,
    pub(crate) declared_parent: Option<StateKey>,
    pub(crate) declared_targets: Vec<StateKey>,
}

impl TreeNode {
    /// Fresh behavior instance for an entry of this node.
    pub(crate) fn create_behavior(&self) -> Box<dyn TreeState> {
        if let Some(spec) = &self.machine {
            return Box::new(NestedMachineState::new(Arc::clone(spec)));
        }
        match &self.behavior {
            Some(factory) => factory(),
            None => Box::new(EmptyState),
        }
    }
}

/// A validated state tree, shared by every machine that runs it.
///
/// Building a tree checks the whole description and reports every
/// structural problem at once.
///
/// # Example
///
/// ```rust
/// use treestate::builder::RuntimeTree;
/// use treestate::descriptor::NodeDescriptor;
///
/// let tree = RuntimeTree::build(
///     NodeDescriptor::root("media")
///         .child(
///             NodeDescriptor::interior("on")
///                 .child(NodeDescriptor::leaf("playing"))
///                 .child(NodeDescriptor::leaf("paused"))
///                 .initial("playing"),
///         )
///         .child(NodeDescriptor::leaf("off"))
///         .initial("off"),
/// )
/// .unwrap();
///
/// assert_eq!(tree.lca(&"playing".into(), &"paused".into()), Some("on".into()));
/// assert_eq!(tree.lca(&"playing".into(), &"off".into()), Some("media".into()));
/// ```
pub struct RuntimeTree {
    nodes: Vec<TreeNode>,
    index: HashMap<StateKey, NodeId>,
    root: NodeId,
}

impl RuntimeTree {
    /// Validate `root` and flatten it into a runtime tree.
    pub fn build(root: NodeDescriptor) -> Result<Self, BuildError> {
        let mut flattener = Flattener::default();
        flattener.insert(root, None, 0);

        let tree = RuntimeTree {
            nodes: flattener.nodes,
            index: flattener.index,
            root: 0,
        };

        match validate(&tree, flattener.duplicates) {
            Validation::Success(_) => Ok(tree),
            Validation::Failure(errors) => Err(BuildError::InvalidTree {
                violations: errors.iter().cloned().collect(),
            }),
        }
    }

    pub fn root_key(&self) -> &StateKey {
        &self.nodes[self.root].key
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every key in depth-first declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &StateKey> {
        self.nodes.iter().map(|node| &node.key)
    }

    pub fn node(&self, key: &StateKey) -> Option<NodeInfo<'_>> {
        let id = self.index_of(key)?;
        Some(NodeInfo { tree: self, id })
    }

    /// `key` and its ancestors, nearest first.
    pub fn ancestors(&self, key: &StateKey) -> Option<Vec<StateKey>> {
        let id = self.index_of(key)?;
        let mut path = self.path_from_root(id);
        path.reverse();
        Some(path.into_iter().map(|id| self.key(id).clone()).collect())
    }

    /// Least common ancestor of two states. A state counts as its own
    /// ancestor.
    pub fn lca(&self, a: &StateKey, b: &StateKey) -> Option<StateKey> {
        let a = self.index_of(a)?;
        let b = self.index_of(b)?;
        Some(self.key(self.lca_of(a, b)).clone())
    }

    pub fn is_ancestor_of(&self, ancestor: &StateKey, descendant: &StateKey) -> bool {
        match (self.index_of(ancestor), self.index_of(descendant)) {
            (Some(a), Some(d)) => a != d && self.is_ancestor_or_self(a, d),
            _ => false,
        }
    }

    pub(crate) fn index_of(&self, key: &StateKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub(crate) fn get(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub(crate) fn key(&self, id: NodeId) -> &StateKey {
        &self.nodes[id].key
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub(crate) fn node_ids(&self) -> std::ops::Range<NodeId> {
        0..self.nodes.len()
    }

    /// Root first, `id` last.
    pub(crate) fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut node = id;
        while let Some(parent) = self.parent(node) {
            path.push(parent);
            node = parent;
        }
        path.reverse();
        path
    }

    /// Nodes strictly below `anchor` down to and including `target`, root
    /// side first. With no anchor the path starts at the root.
    pub(crate) fn path_between(&self, anchor: Option<NodeId>, target: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut node = Some(target);
        while let Some(id) = node {
            if Some(id) == anchor {
                break;
            }
            path.push(id);
            node = self.parent(id);
        }
        path.reverse();
        path
    }

    pub(crate) fn lca_of(&self, a: NodeId, b: NodeId) -> NodeId {
        let (mut a, mut b) = (a, b);
        while self.nodes[a].depth > self.nodes[b].depth {
            a = self.nodes[a].parent.unwrap_or(self.root);
        }
        while self.nodes[b].depth > self.nodes[a].depth {
            b = self.nodes[b].parent.unwrap_or(self.root);
        }
        while a != b {
            a = self.nodes[a].parent.unwrap_or(self.root);
            b = self.nodes[b].parent.unwrap_or(self.root);
        }
        a
    }

    pub(crate) fn is_ancestor_or_self(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        let mut node = Some(descendant);
        while let Some(id) = node {
            if id == ancestor {
                return true;
            }
            node = self.parent(id);
        }
        false
    }
}

impl fmt::Debug for RuntimeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeTree")
            .field("root", self.root_key())
            .field("states", &self.nodes.len())
            .finish()
    }
}

/// Read-only view of one node of a [`RuntimeTree`].
#[derive(Clone, Copy)]
pub struct NodeInfo<'a> {
    tree: &'a RuntimeTree,
    id: NodeId,
}

impl<'a> NodeInfo<'a> {
    fn node(&self) -> &'a TreeNode {
        self.tree.get(self.id)
    }

    pub fn key(&self) -> &'a StateKey {
        &self.node().key
    }

    pub fn kind(&self) -> NodeKind {
        self.node().kind
    }

    pub fn parent(&self) -> Option<&'a StateKey> {
        self.node().parent.map(|id| self.tree.key(id))
    }

    pub fn children(&self) -> Vec<&'a StateKey> {
        self.node().children.iter().map(|&id| self.tree.key(id)).collect()
    }

    pub fn depth(&self) -> usize {
        self.node().depth
    }

    pub fn is_leaf(&self) -> bool {
        self.kind().is_leaf()
    }

    pub fn is_final(&self) -> bool {
        self.kind() == NodeKind::Final
    }

    /// Type name of the state's data, if it carries any.
    pub fn data_type(&self) -> Option<&'static str> {
        self.node().data.as_ref().map(|binding| binding.type_name())
    }

    /// Whether the state's data is saved in checkpoints.
    pub fn is_persistent(&self) -> bool {
        self.node().data.as_ref().is_some_and(|binding| binding.has_codec())
    }

    pub fn metadata(&self) -> &'a BTreeMap<String, serde_json::Value> {
        &self.node().metadata
    }

    pub fn declared_targets(&self) -> &'a [StateKey] {
        &self.node().declared_targets
    }
}

impl fmt::Debug for NodeInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeInfo")
            .field("key", self.key())
            .field("kind", &self.kind())
            .field("parent", &self.parent())
            .finish()
    }
}

#[derive(Default)]
struct Flattener {
    nodes: Vec<TreeNode>,
    index: HashMap<StateKey, NodeId>,
    duplicates: Vec<StateKey>,
}

impl Flattener {
    fn insert(&mut self, descriptor: NodeDescriptor, parent: Option<NodeId>, depth: usize) -> NodeId {
        let NodeDescriptor {
            key,
            kind,
            behavior,
            data,
            filters,
            metadata,
            children,
            initial_child,
            declared_parent,
            declared_targets,
            machine,
        } = descriptor;

        let id = self.nodes.len();
        if self.index.contains_key(&key) {
            self.duplicates.push(key.clone());
        } else {
            self.index.insert(key.clone(), id);
        }

        self.nodes.push(TreeNode {
            key,
            kind,
            parent,
            children: Vec::new(),
            depth,
            initial_child,
            behavior,
            data,
            filters,
            metadata,
            machine,
            declared_parent,
            declared_targets,
        });

        for child in children {
            let child_id = self.insert(child, Some(id), depth + 1);
            self.nodes[id].children.push(child_id);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeViolation;

    fn media() -> NodeDescriptor {
        NodeDescriptor::root("media")
            .child(
                NodeDescriptor::interior("on")
                    .child(NodeDescriptor::leaf("playing"))
                    .child(NodeDescriptor::leaf("paused"))
                    .initial("playing"),
            )
            .child(NodeDescriptor::final_leaf("off"))
            .initial("on")
    }

    #[test]
    fn build_indexes_every_node() {
        let tree = RuntimeTree::build(media()).unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.root_key().as_str(), "media");

        let paused = tree.node(&"paused".into()).unwrap();
        assert_eq!(paused.parent().map(StateKey::as_str), Some("on"));
        assert_eq!(paused.depth(), 2);
        assert!(tree.node(&"off".into()).unwrap().is_final());
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let tree = RuntimeTree::build(media()).unwrap();
        let ancestors = tree.ancestors(&"paused".into()).unwrap();
        let names: Vec<_> = ancestors.iter().map(StateKey::as_str).collect();
        assert_eq!(names, vec!["paused", "on", "media"]);
    }

    #[test]
    fn path_between_excludes_anchor() {
        let tree = RuntimeTree::build(media()).unwrap();
        let on = tree.index_of(&"on".into()).unwrap();
        let paused = tree.index_of(&"paused".into()).unwrap();

        assert_eq!(tree.path_between(Some(on), paused), vec![paused]);
        assert_eq!(tree.path_between(None, paused), vec![tree.root(), on, paused]);
        assert!(tree.path_between(Some(paused), paused).is_empty());
    }

    #[test]
    fn lca_of_state_with_itself_is_itself() {
        let tree = RuntimeTree::build(media()).unwrap();
        assert_eq!(tree.lca(&"on".into(), &"on".into()), Some("on".into()));
        assert_eq!(tree.lca(&"on".into(), &"paused".into()), Some("on".into()));
        assert!(tree.is_ancestor_of(&"media".into(), &"paused".into()));
        assert!(!tree.is_ancestor_of(&"paused".into(), &"paused".into()));
    }

    #[test]
    fn duplicate_keys_are_reported() {
        let result = RuntimeTree::build(
            NodeDescriptor::root("root")
                .child(NodeDescriptor::leaf("a"))
                .child(NodeDescriptor::leaf("a"))
                .initial("a"),
        );
        let error = result.unwrap_err();
        assert!(error
            .violations()
            .contains(&TreeViolation::DuplicateKey { key: "a".into() }));
    }
}
