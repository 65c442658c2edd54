//! Structural validation of a flattened tree.
//!
//! Every rule runs on every node and all violations are accumulated, so a
//! caller fixing a broken description sees the whole list at once.

use super::tree::{NodeId, RuntimeTree};
use super::TreeViolation;
use crate::core::StateKey;
use crate::descriptor::{InitialChild, NodeKind};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<TreeViolation>>;

fn check(ok: bool, violation: impl FnOnce() -> TreeViolation) -> Check {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(violation())
    }
}

pub(crate) fn validate(tree: &RuntimeTree, duplicates: Vec<StateKey>) -> Check {
    let mut checks: Vec<Check> = duplicates
        .into_iter()
        .map(|key| Validation::fail(TreeViolation::DuplicateKey { key }))
        .collect();

    let root = tree.get(tree.root());
    checks.push(check(root.kind == NodeKind::Root, || TreeViolation::NotRoot {
        key: root.key.clone(),
        kind: root.kind,
    }));

    for id in tree.node_ids() {
        checks.extend(check_node(tree, id));
    }

    Validation::all_vec(checks).map(|_| ())
}

fn check_node(tree: &RuntimeTree, id: NodeId) -> Vec<Check> {
    let node = tree.get(id);
    let key = &node.key;
    let mut checks = Vec::new();

    if id != tree.root() {
        checks.push(check(node.kind != NodeKind::Root, || TreeViolation::NestedRoot {
            key: key.clone(),
        }));
    }

    if node.kind.is_composite() {
        checks.push(check(!node.children.is_empty(), || TreeViolation::EmptyComposite {
            key: key.clone(),
        }));
        checks.push(match &node.initial_child {
            None => Validation::fail(TreeViolation::MissingInitialChild { key: key.clone() }),
            Some(InitialChild::Key(child)) => check(
                node.children.iter().any(|&c| tree.key(c) == child),
                || TreeViolation::InvalidInitialChild {
                    parent: key.clone(),
                    child: child.clone(),
                },
            ),
            // Checked when the selector runs
            Some(InitialChild::Select(_)) => Validation::success(()),
        });
    } else {
        checks.push(check(node.children.is_empty(), || TreeViolation::LeafWithChildren {
            key: key.clone(),
            kind: node.kind,
        }));
    }

    if let Some(declared) = &node.declared_parent {
        let actual = node.parent.map(|p| tree.key(p).clone());
        checks.push(if declared == key {
            Validation::fail(TreeViolation::CyclicParent { key: key.clone() })
        } else {
            check(actual.as_ref() == Some(declared), || TreeViolation::ParentMismatch {
                key: key.clone(),
                declared: declared.clone(),
                actual,
            })
        });
    }

    for target in &node.declared_targets {
        checks.push(check(tree.contains(target), || TreeViolation::DanglingTarget {
            from: key.clone(),
            target: target.clone(),
        }));
    }

    if node.kind == NodeKind::Machine {
        checks.push(check(node.behavior.is_none(), || TreeViolation::MachineBehavior {
            key: key.clone(),
        }));
        checks.push(check(node.data.is_none(), || TreeViolation::MachineData {
            key: key.clone(),
        }));
    }

    checks
}

#[cfg(test)]
mod tests {
    use crate::builder::{BuildError, RuntimeTree, TreeViolation};
    use crate::descriptor::{InitialData, NodeDescriptor, NodeKind};

    fn violations(root: NodeDescriptor) -> Vec<TreeViolation> {
        match RuntimeTree::build(root) {
            Err(BuildError::InvalidTree { violations }) => violations,
            Ok(_) => panic!("expected an invalid tree"),
        }
    }

    #[test]
    fn valid_tree_builds() {
        let tree = RuntimeTree::build(
            NodeDescriptor::root("root")
                .child(NodeDescriptor::leaf("a").targets(["b"]).parent("root"))
                .child(NodeDescriptor::leaf("b"))
                .initial("a"),
        );
        assert!(tree.is_ok());
    }

    #[test]
    fn all_violations_are_accumulated() {
        let found = violations(
            NodeDescriptor::root("root")
                .child(NodeDescriptor::interior("empty"))
                .child(NodeDescriptor::leaf("leaf").child(NodeDescriptor::leaf("orphan")))
                .child(NodeDescriptor::leaf("x").targets(["nowhere"]))
                .initial("missing"),
        );

        assert!(found.contains(&TreeViolation::InvalidInitialChild {
            parent: "root".into(),
            child: "missing".into(),
        }));
        assert!(found.contains(&TreeViolation::EmptyComposite { key: "empty".into() }));
        assert!(found.contains(&TreeViolation::MissingInitialChild { key: "empty".into() }));
        assert!(found.contains(&TreeViolation::LeafWithChildren {
            key: "leaf".into(),
            kind: NodeKind::Leaf,
        }));
        assert!(found.contains(&TreeViolation::DanglingTarget {
            from: "x".into(),
            target: "nowhere".into(),
        }));
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn top_node_must_be_root() {
        let found = violations(NodeDescriptor::leaf("lonely"));
        assert_eq!(
            found,
            vec![TreeViolation::NotRoot {
                key: "lonely".into(),
                kind: NodeKind::Leaf,
            }]
        );
    }

    #[test]
    fn final_state_cannot_have_children() {
        let found = violations(
            NodeDescriptor::root("root")
                .child(NodeDescriptor::final_leaf("done").child(NodeDescriptor::leaf("after")))
                .initial("done"),
        );
        assert!(found.contains(&TreeViolation::LeafWithChildren {
            key: "done".into(),
            kind: NodeKind::Final,
        }));
    }

    #[test]
    fn declared_parent_must_match() {
        let found = violations(
            NodeDescriptor::root("root")
                .child(
                    NodeDescriptor::interior("group")
                        .child(NodeDescriptor::leaf("a").parent("root"))
                        .child(NodeDescriptor::leaf("b").parent("b"))
                        .initial("a"),
                )
                .initial("group"),
        );
        assert!(found.contains(&TreeViolation::ParentMismatch {
            key: "a".into(),
            declared: "root".into(),
            actual: Some("group".into()),
        }));
        assert!(found.contains(&TreeViolation::CyclicParent { key: "b".into() }));
    }

    #[test]
    fn nested_roots_are_rejected() {
        let found = violations(
            NodeDescriptor::root("root")
                .child(
                    NodeDescriptor::root("inner")
                        .child(NodeDescriptor::leaf("a"))
                        .initial("a"),
                )
                .initial("inner"),
        );
        assert_eq!(found, vec![TreeViolation::NestedRoot { key: "inner".into() }]);
    }

    #[test]
    fn data_on_ordinary_states_is_fine() {
        let tree = RuntimeTree::build(
            NodeDescriptor::root("root")
                .json_data(InitialData::value(1u32))
                .child(NodeDescriptor::leaf("a").data(InitialData::value("x".to_string())))
                .initial("a"),
        );
        assert!(tree.is_ok());
    }
}
