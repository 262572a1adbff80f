//! Deleting an Update Tree branch

use super::status::synced_parent_id;
use super::UpdateConsolidation;
use duplex_tree::{Operation, TreeNodeModel, UpdateNodeModel};
use duplex_types::{Error, NodeId, Result, UpdateStatus};

impl UpdateConsolidation<'_> {
    /// Record the deletion of `id` and its branch, deepest nodes first.
    ///
    /// Nodes created since the baseline disappear. Nodes moved into the branch go back
    /// to their baseline location as Deleted, unless that location is itself deleted.
    /// Every other node keeps its place with status Deleted.
    pub(super) fn execute_deletion(&mut self, id: NodeId) -> Result<()> {
        for id in self.updates.post_order(id) {
            let Some(model) = self.updates.get(id).cloned() else {
                continue;
            };
            let children: Vec<UpdateNodeModel> = self.updates.children(id).cloned().collect();
            for child in children {
                self.updates.execute(Operation::delete(child))?;
            }
            if let Some(operation) = self.deletion_operation(model)? {
                self.execute_with_missing_ancestors(operation)?;
            }
        }
        Ok(())
    }

    fn deletion_operation(
        &self,
        model: UpdateNodeModel,
    ) -> Result<Option<Operation<UpdateNodeModel>>> {
        let status = model.status;
        if status.contains(UpdateStatus::CREATED) {
            return Ok(Some(Operation::delete(model)));
        }
        if status.contains(UpdateStatus::MOVED) {
            let synced_node = self
                .synced
                .by_own_id(model.id(), self.replica)
                .ok_or_else(|| Error::missing_node(self.synced.label(), model.id()))?;
            let parent_deleted = self
                .nearest_update_ancestor(synced_node.id())
                .is_some_and(|parent| parent.status.contains(UpdateStatus::DELETED));
            if parent_deleted {
                return Ok(Some(Operation::delete(model)));
            }
            let parent_id = synced_parent_id(self.replica, self.synced, synced_node)?;
            let name = synced_node.name().to_string();
            return Ok(Some(Operation::moved(
                model
                    .with_name(name)
                    .with_parent_id(parent_id)
                    .with_status(UpdateStatus::DELETED),
            )));
        }
        if status.contains(UpdateStatus::DELETED) {
            return Ok(None);
        }
        Ok(Some(Operation::update(model.with_status(UpdateStatus::DELETED))))
    }

    /// First Update Tree node among the baseline ancestors of Synced Tree node `synced_id`
    fn nearest_update_ancestor(&self, synced_id: NodeId) -> Option<&UpdateNodeModel> {
        self.synced
            .ancestors(synced_id)
            .find_map(|ancestor| self.updates.get(ancestor.own_id(self.replica)))
    }
}
