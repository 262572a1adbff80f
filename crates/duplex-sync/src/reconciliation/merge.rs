//! Merging the updates of one node and re-reconciling what a deletion affects

use super::detection::{edit_conflict, move_conflict};
use super::pseudo::pseudo_conflicts;
use super::resolution::{resolve_edit_conflict, resolve_move_conflict};
use crate::conflict::{Conflict, ConflictType};
use crate::naming::ConflictNaming;
use crate::state::SyncState;
use duplex_tree::{PreOrder, TreeNodeModel, UpdateNodeModel};
use duplex_types::{Error, NodeId, Replica, Result, UpdateStatus};
use std::collections::HashSet;
use tracing::debug;

/// Reconciliation of one pair of Update Tree nodes into the Propagation Tree.
///
/// A pair is prepared, cleared of pseudo conflicts, checked for every real conflict
/// in a fixed order, merged, status-adjusted and applied. When the result deletes a
/// directory, the nodes of the deleted branch are reconciled again.
pub(crate) struct UpdateMerge<'a> {
    state: &'a mut SyncState,
    naming: &'a ConflictNaming,
    processed: HashSet<NodeId>,
    processing_deletion: bool,
    conflicts: Vec<Conflict>,
}

impl<'a> UpdateMerge<'a> {
    pub(crate) fn new(state: &'a mut SyncState, naming: &'a ConflictNaming) -> Self {
        Self {
            state,
            naming,
            processed: HashSet::new(),
            processing_deletion: false,
            conflicts: Vec::new(),
        }
    }

    /// Conflicts met so far
    pub(crate) fn into_conflicts(self) -> Vec<Conflict> {
        self.conflicts
    }

    /// Put a drained local update back into the local Update Tree and reconcile it
    pub(crate) fn execute_local(&mut self, node: UpdateNodeModel) -> Result<()> {
        let id = node.id();
        self.state.restore_local_update(node)?;
        self.execute(None, Some(id))
    }

    /// Reconcile the remote Update Tree node `remote` with the local Update Tree node
    /// `local`. Nothing happens unless one of them is changed.
    pub(crate) fn execute(&mut self, remote: Option<NodeId>, local: Option<NodeId>) -> Result<()> {
        let remote_changed = remote
            .and_then(|id| self.state.remote_updates.get(id))
            .is_some_and(|node| !node.status.is_unchanged());
        let local_changed = local
            .and_then(|id| self.state.local_updates.get(id))
            .is_some_and(|node| !node.status.is_unchanged());
        if !remote_changed && !local_changed {
            return Ok(());
        }
        self.processed.clear();
        self.reconcile(remote, local)
    }

    fn reconcile(&mut self, remote_id: Option<NodeId>, local_id: Option<NodeId>) -> Result<()> {
        let remote = remote_id.and_then(|id| self.state.remote_updates.get(id).cloned());
        let local = local_id.and_then(|id| self.state.local_updates.get(id).cloned());
        if remote.is_none() && local.is_none() {
            return Ok(());
        }
        let (remote, local) = self.state.prepared(remote.as_ref(), local.as_ref())?;
        if !self.processed.insert(local.id()) {
            return Ok(());
        }
        let previous = self.state.propagation.get(local.id()).cloned();

        self.reconcile_models(remote, local)?;

        // Pseudo conflict resolution may have removed either Update Tree node
        let remote_id = remote_id.filter(|id| self.state.remote_updates.contains(*id));
        let local_id = local_id.filter(|id| self.state.local_updates.contains(*id));
        let previous = previous.map(|node| (node.id(), node.is_deleted()));
        self.process_directory_deletion(remote_id, local_id, previous)
    }

    fn reconcile_models(&mut self, remote: UpdateNodeModel, local: UpdateNodeModel) -> Result<()> {
        let (remote, local) = self.resolve_pseudo_conflicts(remote, local)?;

        let remote = self.resolve_indirect_conflict(remote)?;
        let local = self.resolve_indirect_conflict(local)?;

        let local = match move_conflict(&remote, &local) {
            Some(conflict_type) => {
                self.record(local.id(), conflict_type);
                resolve_move_conflict(&remote, local)
            }
            None => local,
        };

        let (local, backup_name) = match edit_conflict(&remote, &local) {
            Some(conflict_type) => {
                self.record(local.id(), conflict_type);
                let (local, backup_name) = resolve_edit_conflict(&remote, local, self.naming);
                (local, Some(backup_name))
            }
            None => (local, None),
        };

        let mut model = self.state.merged(&remote, &local, backup_name);

        if let Some(conflict_type) = self.state.delete_conflict(&model) {
            self.record(model.id(), conflict_type);
            model = self.state.resolve_delete_conflict(model, conflict_type, self.naming)?;
        }

        if let Some((conflict_type, other)) = self.state.name_clash_conflict(&model) {
            self.record(model.id(), conflict_type);
            model = self.state.resolve_name_clash(model, other, self.naming)?;
        }

        let model = self.state.with_adjusted_status(model)?;
        self.state.apply_to_propagation(model)
    }

    fn resolve_pseudo_conflicts(
        &mut self,
        mut remote: UpdateNodeModel,
        mut local: UpdateNodeModel,
    ) -> Result<(UpdateNodeModel, UpdateNodeModel)> {
        if let Some(conflicting) = self.state.create_create_pseudo_conflict(&remote, &local) {
            let pair_remote = if remote.status.contains(UpdateStatus::CREATED) {
                remote
            } else {
                conflicting.clone()
            };
            let pair_local = if local.status.contains(UpdateStatus::CREATED) {
                local
            } else {
                conflicting
            };
            self.record(pair_local.id(), ConflictType::CreateCreatePseudo);
            (remote, local) = self.state.resolve_pseudo_conflict(
                pair_remote,
                pair_local,
                ConflictType::CreateCreatePseudo,
                UpdateStatus::CREATED,
            )?;
        }

        for (conflict_type, conflicting) in pseudo_conflicts(&remote, &local) {
            self.record(local.id(), conflict_type);
            // Deleted and moved nodes are settled by propagation, after the nodes
            // moved out of a deleted branch and the created parents
            if matches!(
                conflict_type,
                ConflictType::DeleteDeletePseudo | ConflictType::MoveMovePseudo
            ) {
                continue;
            }
            (remote, local) =
                self.state
                    .resolve_pseudo_conflict(remote, local, conflict_type, conflicting)?;
        }
        Ok((remote, local))
    }

    fn resolve_indirect_conflict(&mut self, model: UpdateNodeModel) -> Result<UpdateNodeModel> {
        match self.state.indirect_conflict(&model)? {
            Some(conflict_type) => {
                self.record(model.id(), conflict_type);
                self.state
                    .resolve_indirect_conflict(model, conflict_type, self.naming)
            }
            None => Ok(model),
        }
    }

    fn record(&mut self, node_id: NodeId, conflict_type: ConflictType) {
        debug!("{} conflict on node Id={}", conflict_type, node_id);
        self.conflicts.push(Conflict::new(node_id, conflict_type));
    }

    /// Reconcile again whatever a deletion made stale: the Propagation Tree branch of
    /// a node that just became deleted, and the Synced Tree branch of a directory
    /// deleted on a replica. Not re-entered while already running.
    fn process_directory_deletion(
        &mut self,
        remote_id: Option<NodeId>,
        local_id: Option<NodeId>,
        previous: Option<(NodeId, bool)>,
    ) -> Result<()> {
        if self.processing_deletion {
            return Ok(());
        }
        self.processing_deletion = true;
        let result = self.reconcile_deleted_branches(remote_id, local_id, previous);
        self.processing_deletion = false;
        result
    }

    fn reconcile_deleted_branches(
        &mut self,
        remote_id: Option<NodeId>,
        local_id: Option<NodeId>,
        previous: Option<(NodeId, bool)>,
    ) -> Result<()> {
        if let Some((id, false)) = previous {
            let deleted_now = self
                .state
                .propagation
                .get(id)
                .is_some_and(|node| node.is_deleted());
            if deleted_now {
                self.reconcile_propagation_branch(id)?;
            }
        }

        let deleted = |node: Option<&UpdateNodeModel>| {
            node.is_some_and(|node| node.status.contains(UpdateStatus::DELETED))
        };
        if let Some(id) = remote_id.filter(|id| deleted(self.state.remote_updates.get(*id))) {
            self.reconcile_synced_branch(id, Replica::Remote)
        } else if let Some(id) = local_id.filter(|id| deleted(self.state.local_updates.get(*id))) {
            self.reconcile_synced_branch(id, Replica::Local)
        } else {
            Ok(())
        }
    }

    fn reconcile_propagation_branch(&mut self, id: NodeId) -> Result<()> {
        let mut cursor = PreOrder::excluding(id);
        while let Some(next) = cursor.next_in(&self.state.propagation) {
            let Some(node) = self.state.propagation.get(next) else {
                continue;
            };
            let (local_id, remote_id) = (node.id(), node.alt_id);
            self.reconcile_known(local_id, remote_id)?;
        }
        Ok(())
    }

    /// Reconcile the Synced Tree branch of a directory deleted on `replica`, together
    /// with the children the other replica added to its directories. Nodes still
    /// present in the deleting replica's Update Tree were moved out of the branch
    /// before the deletion; their children are left alone.
    fn reconcile_synced_branch(&mut self, own_id: NodeId, replica: Replica) -> Result<()> {
        let start = self
            .state
            .synced
            .by_own_id(own_id, replica)
            .map(TreeNodeModel::id)
            .ok_or_else(|| Error::missing_node(self.state.synced.label(), own_id))?;
        self.reconcile_other_children(start, replica)?;

        let mut cursor = PreOrder::excluding(start);
        while let Some(next) = cursor.next_in(&self.state.synced) {
            let Some(node) = self.state.synced.get(next) else {
                continue;
            };
            let (local_id, remote_id) = (node.id(), node.alt_id);
            let survived = self
                .state
                .update_tree(replica)
                .contains(node.own_id(replica));

            self.reconcile_known(local_id, remote_id)?;
            self.reconcile_other_children(next, replica)?;
            if survived {
                cursor.skip_children();
            }
        }
        Ok(())
    }

    fn reconcile_known(&mut self, local_id: NodeId, remote_id: NodeId) -> Result<()> {
        let remote = self.state.remote_updates.get(remote_id);
        let local = self.state.local_updates.get(local_id);
        let changed =
            |node: Option<&UpdateNodeModel>| node.is_some_and(|node| !node.status.is_unchanged());
        if !changed(remote) && !changed(local) {
            return Ok(());
        }
        let remote = remote.map(TreeNodeModel::id);
        let local = local.map(TreeNodeModel::id);
        self.reconcile(remote, local)
    }

    /// Reconcile the children the replica other than `replica` has in its Update Tree
    /// under the Synced Tree directory `synced_id`
    fn reconcile_other_children(&mut self, synced_id: NodeId, replica: Replica) -> Result<()> {
        let Some(node) = self.state.synced.get(synced_id) else {
            return Ok(());
        };
        if !node.is_directory() {
            return Ok(());
        }
        let other = replica.other();
        let children = self
            .state
            .update_tree(other)
            .child_ids(node.own_id(other));
        for child in children {
            if !self.state.update_tree(other).contains(child) {
                continue;
            }
            match other {
                Replica::Remote => self.reconcile(Some(child), None)?,
                Replica::Local => self.reconcile(None, Some(child))?,
            }
        }
        Ok(())
    }
}
