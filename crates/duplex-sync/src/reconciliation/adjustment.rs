//! Rename and move bits recomputed from where the node actually is

use crate::state::SyncState;
use duplex_tree::{PropagationNodeModel, TreeNodeModel};
use duplex_types::{NodeId, Result, UpdateStatus};

impl SyncState {
    /// `model` with its Renamed and Moved bits describing the difference between the
    /// merged location and the current location on each replica.
    ///
    /// Conflict resolution can move a node anywhere, so the bits detected on a replica
    /// no longer say what propagation has to do. A deleted node under a deleted
    /// ancestor needs no propagation of its own and becomes Unchanged.
    pub(crate) fn with_adjusted_status(&self, mut model: PropagationNodeModel) -> Result<PropagationNodeModel> {
        if model.is_deleted() {
            if self.destination_deleted(&model)? {
                model.remote_status = UpdateStatus::UNCHANGED;
                model.local_status = UpdateStatus::UNCHANGED;
            }
            return Ok(model);
        }

        let common = model.remote_status.intersect(model.local_status);

        // Remote changes are applied locally: compare with the local location
        if !model.remote_status.contains(UpdateStatus::CREATED) {
            let current = self
                .local_updates
                .get(model.id())
                .map(|node| (node.parent_id(), node.name().to_string()))
                .or_else(|| self.synced_location(model.id()));
            model.remote_status = model
                .remote_status
                .minus(UpdateStatus::RENAMED_AND_MOVED)
                .union(link_change(&model, current))?;
        }

        // Local changes are applied remotely: compare with the remote location
        if !model.local_status.contains(UpdateStatus::CREATED) {
            let current = self
                .remote_updates
                .get(model.alt_id)
                .map(|node| {
                    let parent_id = self
                        .synced
                        .by_alt_id(&node.parent_id())
                        .map_or(node.parent_id(), TreeNodeModel::id);
                    (parent_id, node.name().to_string())
                })
                .or_else(|| self.synced_location(model.id()));
            model.local_status = model
                .local_status
                .minus(UpdateStatus::RENAMED_AND_MOVED)
                .union(link_change(&model, current))?;
        }

        // A change both replicas made that neither has to apply any more still has to
        // be recorded in the Synced Tree by propagation
        let missing = common
            .minus(model.remote_status)
            .minus(model.local_status)
            .intersect(UpdateStatus::RENAMED_AND_MOVED);
        model.remote_status = model.remote_status.union(missing)?;
        model.local_status = model.local_status.union(missing)?;
        Ok(model)
    }

    fn synced_location(&self, id: NodeId) -> Option<(NodeId, String)> {
        self.synced
            .get(id)
            .map(|node| (node.parent_id(), node.name().to_string()))
    }
}

fn link_change(model: &PropagationNodeModel, current: Option<(NodeId, String)>) -> UpdateStatus {
    let Some((parent_id, name)) = current else {
        return UpdateStatus::UNCHANGED;
    };
    let mut status = UpdateStatus::UNCHANGED;
    if model.name() != name {
        status = status | UpdateStatus::RENAMED;
    }
    if model.parent_id() != parent_id {
        status = status | UpdateStatus::MOVED;
    }
    status
}
