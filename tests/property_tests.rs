//! Property-based tests for tree structure and transitions.
//!
//! These tests use proptest to generate random trees and verify properties
//! hold across many shapes.

use proptest::prelude::*;
use std::collections::HashSet;
use treestate::{
    Checkpoint, DataStateKey, InitialData, NodeDescriptor, RuntimeTree, StateBehavior, StateKey, TreeStateMachine,
};

/// Adds `by` to the data of state `key`.
struct Bump {
    key: StateKey,
    by: u32,
}

/// A random tree: node `i > 0` hangs under `parents[i - 1]`, an earlier node.
#[derive(Debug, Clone)]
struct Shape {
    parents: Vec<usize>,
}

impl Shape {
    fn len(&self) -> usize {
        self.parents.len() + 1
    }

    fn parent(&self, node: usize) -> Option<usize> {
        node.checked_sub(1).map(|i| self.parents[i])
    }

    fn children(&self, node: usize) -> Vec<usize> {
        (1..self.len()).filter(|&n| self.parent(n) == Some(node)).collect()
    }

    fn key(node: usize) -> StateKey {
        StateKey::new(format!("s{node}"))
    }

    fn leaves(&self) -> Vec<usize> {
        (0..self.len()).filter(|&n| self.children(n).is_empty()).collect()
    }

    fn path_from_root(&self, node: usize) -> Vec<usize> {
        let mut path = vec![node];
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Leaf reached from `node` by always taking the first child.
    fn initial_leaf(&self, node: usize) -> usize {
        match self.children(node).first() {
            Some(&child) => self.initial_leaf(child),
            None => node,
        }
    }

    fn descriptor(&self, node: usize) -> NodeDescriptor {
        self.descriptor_with_data(node, &[])
    }

    /// Like `descriptor`, but node `i` carries a JSON `u32` starting at `i`
    /// when `carries[i]` is set.
    fn descriptor_with_data(&self, node: usize, carries: &[bool]) -> NodeDescriptor {
        let children = self.children(node);
        let key = Self::key(node);
        let mut descriptor = match (node, children.is_empty()) {
            (0, _) => NodeDescriptor::root(key),
            (_, true) => NodeDescriptor::leaf(key),
            (_, false) => NodeDescriptor::interior(key),
        };
        if carries.get(node).copied().unwrap_or(false) {
            descriptor = descriptor.json_data(InitialData::value(node as u32));
        }
        if let Some(&first) = children.first() {
            descriptor = descriptor.initial(Self::key(first));
        }
        for child in children {
            descriptor = descriptor.child(self.descriptor_with_data(child, carries));
        }
        descriptor
    }

    /// Root descriptor with data states whose root handler applies `Bump`s.
    fn data_machine_descriptor(&self, carries: &[bool]) -> NodeDescriptor {
        self.descriptor_with_data(0, carries)
            .behavior(StateBehavior::new().on_message(|ctx| {
                let Some(bump) = ctx.message_as::<Bump>() else {
                    return Ok(ctx.unhandled());
                };
                let by = bump.by;
                ctx.data(&DataStateKey::<u32>::new(bump.key.as_str()))?
                    .update(|n| n + by)?;
                Ok(ctx.stay())
            }))
    }

    /// Root descriptor whose root handler transitions to any posted key.
    fn machine_descriptor(&self) -> NodeDescriptor {
        self.descriptor(0).behavior(StateBehavior::new().on_message(|ctx| {
            Ok(match ctx.message_as::<StateKey>() {
                Some(target) => ctx.go_to(target),
                None => ctx.unhandled(),
            })
        }))
    }
}

prop_compose! {
    fn arbitrary_shape()(len in 1usize..12)(
        choices in proptest::collection::vec(any::<proptest::sample::Index>(), len)
    ) -> Shape {
        let parents = choices
            .iter()
            .enumerate()
            .map(|(i, choice)| choice.index(i + 1))
            .collect();
        Shape { parents }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn lca_is_the_deepest_shared_ancestor(
        shape in arbitrary_shape(),
        a in any::<proptest::sample::Index>(),
        b in any::<proptest::sample::Index>(),
    ) {
        let tree = RuntimeTree::build(shape.descriptor(0)).unwrap();
        let (a, b) = (a.index(shape.len()), b.index(shape.len()));

        let path_a = shape.path_from_root(a);
        let path_b = shape.path_from_root(b);
        let expected = path_a
            .iter()
            .zip(&path_b)
            .take_while(|(x, y)| x == y)
            .last()
            .map(|(x, _)| *x)
            .unwrap();

        let lca = tree.lca(&Shape::key(a), &Shape::key(b)).unwrap();
        prop_assert_eq!(&lca, &Shape::key(expected));
        prop_assert_eq!(tree.lca(&Shape::key(b), &Shape::key(a)), Some(lca));
    }

    #[test]
    fn ancestors_match_parent_links(shape in arbitrary_shape(), node in any::<proptest::sample::Index>()) {
        let tree = RuntimeTree::build(shape.descriptor(0)).unwrap();
        let node = node.index(shape.len());

        let mut expected: Vec<StateKey> = shape.path_from_root(node).into_iter().map(Shape::key).collect();
        expected.reverse();
        prop_assert_eq!(tree.ancestors(&Shape::key(node)), Some(expected));
        prop_assert_eq!(tree.node(&Shape::key(node)).unwrap().depth(), shape.path_from_root(node).len() - 1);
    }

    #[test]
    fn start_always_reaches_the_initial_leaf(shape in arbitrary_shape()) {
        let leaf = runtime().block_on(async {
            let machine = TreeStateMachine::new(shape.descriptor(0)).unwrap();
            machine.start().await.unwrap().key()
        });

        prop_assert_eq!(&leaf, &Shape::key(shape.initial_leaf(0)));
        prop_assert!(RuntimeTree::build(shape.descriptor(0)).unwrap().node(&leaf).unwrap().is_leaf());
    }

    #[test]
    fn exits_and_entries_are_disjoint_except_for_self_transitions(
        shape in arbitrary_shape(),
        target in any::<proptest::sample::Index>(),
    ) {
        let leaves = shape.leaves();
        let target = leaves[target.index(leaves.len())];
        let start = shape.initial_leaf(0);

        let record = runtime().block_on(async {
            let machine = TreeStateMachine::new(shape.machine_descriptor()).unwrap();
            machine.start().await.unwrap();
            let result = machine.post(Shape::key(target)).await.unwrap();
            result.transition().cloned().unwrap()
        });

        prop_assert_eq!(&record.to, &Shape::key(target));
        let exited: HashSet<_> = record.exited.iter().cloned().collect();
        let entered: HashSet<_> = record.entered.iter().cloned().collect();
        let shared: Vec<_> = exited.intersection(&entered).cloned().collect();
        if target == start {
            prop_assert_eq!(shared, vec![Shape::key(start)]);
        } else {
            prop_assert!(shared.is_empty());
        }

        // Exits run leaf upward, entries root downward
        let expected_exit: Vec<StateKey> = shape
            .path_from_root(start)
            .into_iter()
            .rev()
            .take(record.exited.len())
            .map(Shape::key)
            .collect();
        prop_assert_eq!(&record.exited, &expected_exit);
        let target_path: Vec<StateKey> = shape.path_from_root(target).into_iter().map(Shape::key).collect();
        prop_assert!(target_path.ends_with(&record.entered));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn save_then_load_restores_leaf_and_data(
        shape in arbitrary_shape(),
        carries in proptest::collection::vec(any::<bool>(), 12),
        bumps in proptest::collection::vec(1u32..1000, 12),
        leaf in any::<proptest::sample::Index>(),
    ) {
        let leaves = shape.leaves();
        let leaf = leaves[leaf.index(leaves.len())];
        let data_path: Vec<usize> = shape
            .path_from_root(leaf)
            .into_iter()
            .filter(|&node| carries[node])
            .collect();

        let restored = runtime().block_on(async {
            let machine = TreeStateMachine::new(shape.data_machine_descriptor(&carries)).unwrap();
            machine.start_at(Shape::key(leaf)).await.unwrap();
            for &node in &data_path {
                let result = machine.post(Bump { key: Shape::key(node), by: bumps[node] }).await.unwrap();
                assert!(result.is_handled());
            }
            let checkpoint = machine.save().await.unwrap();

            let encodings = vec![
                Checkpoint::from_json(&checkpoint.to_json().unwrap()).unwrap(),
                Checkpoint::from_binary(&checkpoint.to_binary().unwrap()).unwrap(),
            ];
            let mut restored = Vec::new();
            for decoded in encodings {
                assert_eq!(decoded, checkpoint);
                let machine = TreeStateMachine::new(shape.data_machine_descriptor(&carries)).unwrap();
                let current = machine.load(&decoded).await.unwrap();
                let data: Vec<u32> = data_path
                    .iter()
                    .map(|&node| {
                        machine
                            .data_value(&DataStateKey::<u32>::new(Shape::key(node).as_str()))
                            .unwrap()
                            .value()
                            .unwrap()
                    })
                    .collect();
                restored.push((current.key(), data));
            }
            restored
        });

        let expected: Vec<u32> = data_path.iter().map(|&node| node as u32 + bumps[node]).collect();
        for (key, data) in restored {
            prop_assert_eq!(&key, &Shape::key(leaf));
            prop_assert_eq!(&data, &expected);
        }
    }
}
