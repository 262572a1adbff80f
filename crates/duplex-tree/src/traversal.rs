//! Pre-order traversal that tolerates tree mutation between steps

use crate::model::TreeNodeModel;
use crate::tree::FileSystemTree;
use duplex_types::NodeId;

/// Pre-order cursor over a subtree.
///
/// The cursor holds ids only and reads the tree on every step, so callers may mutate
/// the tree between steps. Children of the last visited node are expanded lazily and
/// can be skipped with [`PreOrder::skip_children`]. Nodes removed before they are
/// reached are not visited.
#[derive(Debug, Clone)]
pub struct PreOrder {
    stack: Vec<NodeId>,
    expand: Option<NodeId>,
}

impl PreOrder {
    /// Visit `start` and its descendants
    pub fn including(start: NodeId) -> Self {
        Self {
            stack: vec![start],
            expand: None,
        }
    }

    /// Visit the descendants of `start` only
    pub fn excluding(start: NodeId) -> Self {
        Self {
            stack: Vec::new(),
            expand: Some(start),
        }
    }

    /// Do not descend into the last visited node
    pub fn skip_children(&mut self) {
        self.expand = None;
    }

    /// Next node id, reading the current state of `tree`
    pub fn next_in<M: TreeNodeModel>(&mut self, tree: &FileSystemTree<M>) -> Option<NodeId> {
        if let Some(parent) = self.expand.take() {
            let children = tree.child_ids(parent);
            self.stack.extend(children.into_iter().rev());
        }
        while let Some(id) = self.stack.pop() {
            if tree.contains(id) {
                self.expand = Some(id);
                return Some(id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use crate::update::{UpdateNodeModel, UpdateTree};
    use duplex_types::UpdateStatus;

    fn id(value: u64) -> NodeId {
        NodeId::new(value)
    }

    fn tree() -> UpdateTree {
        let mut tree = UpdateTree::default();
        tree.execute_all([
            Operation::create(UpdateNodeModel::directory(id(1), id(0), "a", UpdateStatus::UNCHANGED)),
            Operation::create(UpdateNodeModel::directory(id(2), id(1), "b", UpdateStatus::UNCHANGED)),
            Operation::create(UpdateNodeModel::file(id(3), id(2), "c", UpdateStatus::EDITED)),
            Operation::create(UpdateNodeModel::file(id(4), id(1), "d", UpdateStatus::EDITED)),
        ])
        .unwrap();
        tree
    }

    #[test]
    fn test_excluding_start_with_skip() {
        let tree = tree();
        let mut cursor = PreOrder::excluding(id(1));
        let mut visited = Vec::new();
        while let Some(node) = cursor.next_in(&tree) {
            visited.push(node);
            if node == id(2) {
                cursor.skip_children();
            }
        }
        assert_eq!(visited, vec![id(2), id(4)]);
    }

    #[test]
    fn test_mutation_between_steps() {
        let mut tree = tree();
        let mut cursor = PreOrder::including(id(1));
        assert_eq!(cursor.next_in(&tree), Some(id(1)));
        assert_eq!(cursor.next_in(&tree), Some(id(2)));
        let removed = tree.get(id(4)).unwrap().clone();
        tree.execute(Operation::delete(removed)).unwrap();
        assert_eq!(cursor.next_in(&tree), Some(id(3)));
        assert_eq!(cursor.next_in(&tree), None);
    }
}
