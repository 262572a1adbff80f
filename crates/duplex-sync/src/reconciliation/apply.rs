//! Saving a reconciled node to the Propagation Tree

use crate::state::SyncState;
use duplex_tree::{equalize_operations, Operation, OperationType, PropagationNodeModel, TreeNodeModel};
use duplex_types::{Error, NodeId, Result};

impl SyncState {
    /// Make the Propagation Tree node `model.id()` equal to `model`.
    ///
    /// Missing ancestors are copied from the Synced Tree as Unchanged nodes. When another
    /// node already holds the remote id of `model`, the two are the same node reached
    /// through both replicas: its children move under `model` and it is removed.
    /// Unchanged leaves left behind are pruned.
    pub(crate) fn apply_to_propagation(&mut self, model: PropagationNodeModel) -> Result<()> {
        let current = self.propagation.get(model.id()).cloned();
        if current.is_none() && model.is_unchanged() && !self.accepts_unchanged_child(model.parent_id()) {
            return Ok(());
        }

        let other_id = self.take_over_alt_id(&model)?;
        let previous_parent = current.as_ref().map(TreeNodeModel::parent_id);

        for operation in equalize_operations(current.as_ref(), Some(&model))? {
            let operations = self.with_missing_propagation_ancestors(operation)?;
            self.propagation.execute_all(operations)?;
        }

        if let Some(other_id) = other_id {
            for child in self.propagation.children(other_id).cloned().collect::<Vec<_>>() {
                let mut moved = child;
                moved.node.parent_id = model.id();
                self.propagation.execute(Operation::moved(moved))?;
            }
            let other = self.propagation.require(other_id)?.clone();
            self.propagation.execute(Operation::delete(other))?;
        }

        self.propagation.remove_unchanged_leaves(model.id())?;
        if let Some(parent_id) = previous_parent {
            self.propagation.remove_unchanged_leaves(parent_id)?;
        }
        Ok(())
    }

    /// An Unchanged node is only worth keeping under an existing, not deleted parent
    fn accepts_unchanged_child(&self, parent_id: NodeId) -> bool {
        self.propagation
            .get(parent_id)
            .is_some_and(|parent| self.propagation.is_root(parent_id) || !parent.is_deleted())
    }

    /// Free the remote id of `model` when a node copied from the remote replica holds
    /// it. Returns that node, now to be merged into `model`.
    fn take_over_alt_id(&mut self, model: &PropagationNodeModel) -> Result<Option<NodeId>> {
        if model.id() == model.alt_id {
            return Ok(None);
        }
        let Some(other) = self.propagation.by_alt_id(&model.alt_id) else {
            return Ok(None);
        };
        if other.id() == model.id() {
            return Ok(None);
        }
        if other.id() != other.alt_id {
            return Err(Error::fault(format!(
                "{}: remote id {} of node Id={} is already used by node Id={}",
                self.propagation.label(),
                model.alt_id,
                model.id(),
                other.id()
            )));
        }
        let mut other = other.clone();
        let other_id = other.id();
        other.alt_id = model.id();
        self.propagation.execute(Operation::update(other))?;
        Ok(Some(other_id))
    }

    /// `operation` preceded by the Creates of the Propagation Tree ancestors of its
    /// target parent, copied from the Synced Tree
    fn with_missing_propagation_ancestors(
        &self,
        operation: Operation<PropagationNodeModel>,
    ) -> Result<Vec<Operation<PropagationNodeModel>>> {
        if !matches!(operation.kind, OperationType::Create | OperationType::Move) {
            return Ok(vec![operation]);
        }
        let parent_id = operation.model.parent_id();
        if self.propagation.contains(parent_id) {
            return Ok(vec![operation]);
        }

        let mut synced_node = self.synced.require(parent_id)?;
        let mut chain = Vec::new();
        let mut existing = None;
        while existing.is_none() && !self.synced.is_root(synced_node.id()) {
            chain.push(synced_node);
            synced_node = self.synced.require(synced_node.parent_id())?;
            existing = self.propagation.get(synced_node.id());
        }
        if let Some(ancestor) = existing.filter(|ancestor| ancestor.is_deleted()) {
            return Err(Error::fault(format!(
                "{}: parent node Id={} status is Deleted",
                self.propagation.label(),
                ancestor.id()
            )));
        }

        let mut operations: Vec<_> = chain
            .into_iter()
            .rev()
            .map(|node| Operation::create(PropagationNodeModel::from(node)))
            .collect();
        operations.push(operation);
        Ok(operations)
    }
}
