//! Selection of nodes awaiting enumeration or deletion

use crate::model::{AdapterNodeModel, AdapterTree, AdapterTreeExt};
use crate::status::AdapterNodeStatus;
use duplex_tree::{PreOrder, TreeNodeModel};
use duplex_types::NodeId;
use std::collections::HashSet;

/// Pre-order walk over a sync root's branch yielding nodes that need enumeration.
///
/// Lost and deleted nodes are skipped together with their subtrees, and nothing below
/// a node that does not start a stable branch is visited. The tree is re-read on every
/// step, so enumeration may run between steps.
#[derive(Debug, Clone)]
pub struct DirtyNodesTraversal {
    cursor: PreOrder,
    last: Option<NodeId>,
}

impl DirtyNodesTraversal {
    /// Walk the branch starting at `start`
    pub fn new(start: NodeId) -> Self {
        Self {
            cursor: PreOrder::including(start),
            last: None,
        }
    }

    /// Next node to enumerate
    pub fn next_in(&mut self, tree: &AdapterTree) -> Option<NodeId> {
        const PENDING: AdapterNodeStatus = AdapterNodeStatus::DIRTY_PLACEHOLDER
            .with(AdapterNodeStatus::DIRTY_ATTRIBUTES)
            .with(AdapterNodeStatus::DIRTY_CHILDREN);

        if let Some(last) = self.last.take() {
            if !tree.get(last).is_some_and(AdapterNodeModel::starts_stable_branch) {
                self.cursor.skip_children();
            }
        }
        while let Some(id) = self.cursor.next_in(tree) {
            let Some(model) = tree.get(id) else {
                continue;
            };
            if !tree.is_branch_stable(id) || model.is_lost_or_deleted() {
                self.cursor.skip_children();
                continue;
            }
            if model.status.contains_any(PENDING) {
                self.last = Some(id);
                return Some(id);
            }
            if !model.starts_stable_branch() {
                self.cursor.skip_children();
            }
        }
        None
    }
}

/// Lost or deleted nodes of a branch in post-order, leaving out every branch that
/// contains the source of a copy
pub fn deletable_nodes(tree: &AdapterTree, start: NodeId) -> Vec<NodeId> {
    let mut protected = HashSet::new();
    let mut deletable = Vec::new();
    for id in tree.post_order(start) {
        let Some(model) = tree.get(id) else {
            continue;
        };
        if model.status.contains(AdapterNodeStatus::DIRTY_COPIED_FROM)
            || tree.child_ids(id).iter().any(|child| protected.contains(child))
        {
            protected.insert(id);
            continue;
        }
        if model.is_lost_or_deleted() && !tree.is_root(id) {
            deletable.push(model.id());
        }
    }
    deletable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adapter_tree;
    use duplex_tree::Operation;
    use duplex_types::NodeAttributes;

    fn id(value: u64) -> NodeId {
        NodeId::new(value)
    }

    fn dir(node: u64, parent: u64, status: AdapterNodeStatus) -> Operation<AdapterNodeModel> {
        Operation::create(AdapterNodeModel::directory(id(node), id(parent), format!("d{node}")).with_status(status))
    }

    fn file(node: u64, parent: u64, status: AdapterNodeStatus) -> Operation<AdapterNodeModel> {
        Operation::create(
            AdapterNodeModel::file(id(node), id(parent), format!("f{node}"), NodeAttributes::default())
                .with_status(status),
        )
    }

    fn collect(tree: &AdapterTree, start: NodeId) -> Vec<NodeId> {
        let mut traversal = DirtyNodesTraversal::new(start);
        std::iter::from_fn(|| traversal.next_in(tree)).collect()
    }

    #[test]
    fn test_unstable_branches_are_not_entered() {
        let mut tree = adapter_tree("test");
        tree.execute_all([
            dir(1, 0, AdapterNodeStatus::DIRTY_CHILDREN),
            dir(2, 1, AdapterNodeStatus::DIRTY_DESCENDANTS),
            file(3, 2, AdapterNodeStatus::DIRTY_ATTRIBUTES),
            dir(4, 1, AdapterNodeStatus::NONE),
            file(5, 4, AdapterNodeStatus::DIRTY_ATTRIBUTES),
            dir(6, 1, AdapterNodeStatus::DIRTY_PARENT),
            file(7, 6, AdapterNodeStatus::DIRTY_ATTRIBUTES),
        ])
        .unwrap();
        assert_eq!(collect(&tree, id(1)), vec![id(1), id(2), id(5)]);
    }

    #[test]
    fn test_enumeration_between_steps_is_observed() {
        let mut tree = adapter_tree("test");
        tree.execute_all([
            dir(1, 0, AdapterNodeStatus::DIRTY_DESCENDANTS),
            file(2, 1, AdapterNodeStatus::DIRTY_ATTRIBUTES),
        ])
        .unwrap();
        let mut traversal = DirtyNodesTraversal::new(id(1));
        assert_eq!(traversal.next_in(&tree), Some(id(1)));

        let done = tree.get(id(1)).unwrap().clone().with_status(AdapterNodeStatus::NONE);
        tree.execute(Operation::update(done)).unwrap();
        assert_eq!(traversal.next_in(&tree), Some(id(2)));
        assert_eq!(traversal.next_in(&tree), None);
    }

    #[test]
    fn test_deletable_nodes_skip_copied_branches() {
        let mut tree = adapter_tree("test");
        tree.execute_all([
            dir(1, 0, AdapterNodeStatus::NONE),
            dir(2, 1, AdapterNodeStatus::DIRTY_DELETED),
            file(3, 2, AdapterNodeStatus::DIRTY_COPIED_FROM),
            dir(4, 1, AdapterNodeStatus::DIRTY_PARENT),
            file(5, 4, AdapterNodeStatus::DIRTY_PARENT),
        ])
        .unwrap();
        assert_eq!(deletable_nodes(&tree, id(1)), vec![id(5), id(4)]);
    }
}
