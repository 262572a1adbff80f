//! Pairing a remote and a local update of the same node

use crate::state::SyncState;
use duplex_tree::{SyncedNodeModel, TreeNodeModel, UpdateNodeModel};
use duplex_types::{Error, NodeId, Result, UpdateStatus};

impl SyncState {
    /// Remote Update Tree model translated to local ids wherever the Synced Tree links
    /// the remote id to a local one. Remote-only nodes keep their remote ids.
    pub(crate) fn mapped_from_remote(&self, model: &UpdateNodeModel) -> UpdateNodeModel {
        let id = self.local_id_of(model.id());
        let parent_id = self.local_id_of(model.parent_id());
        model.clone().with_id(id).with_parent_id(parent_id)
    }

    fn local_id_of(&self, remote_id: NodeId) -> NodeId {
        self.synced
            .by_alt_id(&remote_id)
            .map_or(remote_id, TreeNodeModel::id)
    }

    /// Both sides of a node in local ids, filling the absent side with its current
    /// state: an Unchanged copy of the present side for nodes only it created, the
    /// other replica's Update Tree node, or the Synced Tree node.
    ///
    /// A filled-in side is Deleted when the present side changed the node and the
    /// other replica deleted one of its ancestors.
    pub(crate) fn prepared(
        &self,
        remote: Option<&UpdateNodeModel>,
        local: Option<&UpdateNodeModel>,
    ) -> Result<(UpdateNodeModel, UpdateNodeModel)> {
        match (remote, local) {
            (Some(remote), Some(local)) => Ok((self.mapped_from_remote(remote), local.clone())),
            (Some(remote), None) => Ok((self.mapped_from_remote(remote), self.local_side_of(remote)?)),
            (None, Some(local)) => Ok((self.remote_side_of(local)?, local.clone())),
            (None, None) => Err(Error::fault("Nothing to reconcile, both updates are absent")),
        }
    }

    fn remote_side_of(&self, local: &UpdateNodeModel) -> Result<UpdateNodeModel> {
        if is_only_created(local.status) {
            return Ok(local.clone().with_status(UpdateStatus::UNCHANGED));
        }
        let synced_node = self.synced.require(local.id())?;
        if let Some(remote) = self.remote_updates.get(synced_node.alt_id) {
            return Ok(self.mapped_from_remote(remote));
        }
        let deleted = !local.status.is_unchanged()
            && self.nearest_update_ancestor_deleted(synced_node, |node| {
                self.remote_updates.get(node.alt_id)
            });
        Ok(synced_copy(synced_node, deleted))
    }

    fn local_side_of(&self, remote: &UpdateNodeModel) -> Result<UpdateNodeModel> {
        if is_only_created(remote.status) {
            return Ok(self
                .mapped_from_remote(remote)
                .with_status(UpdateStatus::UNCHANGED));
        }
        let synced_node = self
            .synced
            .by_alt_id(&remote.id())
            .ok_or_else(|| Error::missing_node(self.synced.label(), remote.id()))?;
        if let Some(local) = self.local_updates.get(synced_node.id()) {
            return Ok(local.clone());
        }
        let deleted = !remote.status.is_unchanged()
            && self.nearest_update_ancestor_deleted(synced_node, |node| {
                self.local_updates.get(node.id())
            });
        Ok(synced_copy(synced_node, deleted))
    }

    /// Whether the first Update Tree node found among the Synced Tree ancestors of
    /// `node` is Deleted. The Update Tree root is found last and is never Deleted.
    fn nearest_update_ancestor_deleted<'a, F>(&'a self, node: &SyncedNodeModel, lookup: F) -> bool
    where
        F: Fn(&SyncedNodeModel) -> Option<&'a UpdateNodeModel>,
    {
        self.synced
            .ancestors(node.id())
            .find_map(lookup)
            .is_some_and(|ancestor| ancestor.status.contains(UpdateStatus::DELETED))
    }
}

/// True when Created is the only change bit, Restore aside
fn is_only_created(status: UpdateStatus) -> bool {
    UpdateStatus::from_bits_truncate(status.bits() & UpdateStatus::ALL.bits())
        == UpdateStatus::CREATED
}

fn synced_copy(node: &SyncedNodeModel, deleted: bool) -> UpdateNodeModel {
    let status = if deleted {
        UpdateStatus::DELETED
    } else {
        UpdateStatus::UNCHANGED
    };
    UpdateNodeModel::new(node.node.clone(), status)
}
