//! Pseudo conflicts: both replicas made the same change

use crate::conflict::ConflictType;
use crate::state::SyncState;
use duplex_tree::{
    Operation, OperationType, SyncedNodeModel, TreeNodeModel, UpdateNodeModel, UpdateTree,
};
use duplex_types::{Error, NodeId, NodeType, Result, UpdateStatus};

impl SyncState {
    /// A node created on the other replica under the same parent with the same name
    /// and type as the created side of the pair. Directories always match, files match
    /// when their content is the same.
    ///
    /// Returns the conflicting node in local ids.
    pub(crate) fn create_create_pseudo_conflict(
        &self,
        remote: &UpdateNodeModel,
        local: &UpdateNodeModel,
    ) -> Option<UpdateNodeModel> {
        if remote.status.contains(UpdateStatus::CREATED) {
            let conflicting = self
                .local_parent_of(remote.parent_id())
                .and_then(|parent| created_sibling(&self.local_updates, parent, remote));
            if let Some(conflicting) = conflicting.filter(|node| same_created_node(remote, node)) {
                return Some(conflicting);
            }
        }
        if local.status.contains(UpdateStatus::CREATED) {
            let conflicting = self
                .remote_parent_of(local.parent_id())
                .and_then(|parent| created_sibling(&self.remote_updates, parent, local));
            if let Some(conflicting) = conflicting.filter(|node| same_created_node(local, node)) {
                return Some(self.mapped_from_remote(&conflicting));
            }
        }
        None
    }

    /// Local Update Tree node of the parent `parent_id`, given in local ids
    fn local_parent_of(&self, parent_id: NodeId) -> Option<NodeId> {
        if self.propagation.contains(parent_id) || self.synced.contains(parent_id) {
            return Some(parent_id).filter(|id| self.local_updates.contains(*id));
        }
        None
    }

    /// Remote Update Tree node of the parent `parent_id`, given in local ids
    fn remote_parent_of(&self, parent_id: NodeId) -> Option<NodeId> {
        let alt_id = match self.propagation.get(parent_id) {
            Some(parent) => parent.alt_id,
            None => self.synced.get(parent_id)?.alt_id,
        };
        Some(alt_id).filter(|id| self.remote_updates.contains(*id))
    }

    /// Treat the shared change as already synchronized: drop it from both Update Trees,
    /// record it in the Synced Tree, and return both sides without it
    pub(crate) fn resolve_pseudo_conflict(
        &mut self,
        remote: UpdateNodeModel,
        local: UpdateNodeModel,
        conflict_type: ConflictType,
        conflicting: UpdateStatus,
    ) -> Result<(UpdateNodeModel, UpdateNodeModel)> {
        let (kind, valid) = match conflict_type {
            ConflictType::CreateCreatePseudo => {
                (OperationType::Create, conflicting == UpdateStatus::CREATED)
            }
            ConflictType::MoveMovePseudo => (
                OperationType::Move,
                conflicting.intersect(UpdateStatus::RENAMED_AND_MOVED) == conflicting,
            ),
            ConflictType::EditEditPseudo => {
                (OperationType::Edit, conflicting == UpdateStatus::EDITED)
            }
            ConflictType::DeleteDeletePseudo => {
                (OperationType::Delete, conflicting.contains(UpdateStatus::DELETED))
            }
            other => {
                return Err(Error::fault(format!("{} is not a pseudo conflict", other)));
            }
        };
        if !valid {
            return Err(Error::fault(format!(
                "Invalid conflicting status {:?} for {} conflict",
                conflicting, conflict_type
            )));
        }
        if conflicting.is_unchanged() {
            return Ok((remote, local));
        }

        let remote_id = self
            .synced
            .get(remote.id())
            .map_or(remote.id(), |node| node.alt_id);
        adjust_update_tree(&mut self.remote_updates, remote_id, conflicting)?;
        adjust_update_tree(&mut self.local_updates, local.id(), conflicting)?;
        self.adjust_synced_tree(&remote, &local, kind)?;

        let remote_status = remote.status.minus(conflicting);
        let local_status = local.status.minus(conflicting);
        Ok((remote.with_status(remote_status), local.with_status(local_status)))
    }

    fn adjust_synced_tree(
        &mut self,
        remote: &UpdateNodeModel,
        local: &UpdateNodeModel,
        kind: OperationType,
    ) -> Result<()> {
        let mut model = SyncedNodeModel::new(local.node.clone(), remote.id());
        if !matches!(kind, OperationType::Create | OperationType::Delete) {
            let synced_node = self.synced.require(local.id())?;
            if kind == OperationType::Move {
                if remote.name() != local.name() {
                    model.node.name = synced_node.name().to_string();
                }
                if remote.parent_id() != local.parent_id() {
                    model.node.parent_id = synced_node.parent_id();
                }
            }
            model.alt_id = synced_node.alt_id;
        }
        self.synced.execute(Operation::new(kind, model))
    }
}

/// Same-change conflicts between the two sides, at most Edit-Edit and Move-Move
/// together, each with the status both sides share
pub(super) fn pseudo_conflicts(
    remote: &UpdateNodeModel,
    local: &UpdateNodeModel,
) -> Vec<(ConflictType, UpdateStatus)> {
    let common = remote.status.intersect(local.status);
    let mut conflicts = Vec::new();

    if common.contains(UpdateStatus::EDITED) && remote.attributes().same_content(local.attributes()) {
        conflicts.push((ConflictType::EditEditPseudo, UpdateStatus::EDITED));
    }

    let mut moved = UpdateStatus::UNCHANGED;
    if common.contains(UpdateStatus::RENAMED) && remote.name() == local.name() {
        moved = moved | UpdateStatus::RENAMED;
    }
    if common.contains(UpdateStatus::MOVED) && remote.parent_id() == local.parent_id() {
        moved = moved | UpdateStatus::MOVED;
    }
    if !moved.is_unchanged() {
        conflicts.push((ConflictType::MoveMovePseudo, moved));
    }

    if common.contains(UpdateStatus::DELETED) {
        conflicts.push((ConflictType::DeleteDeletePseudo, UpdateStatus::DELETED));
    }
    conflicts
}

/// Remove `conflicting` from the Update Tree node `id` and prune it if nothing is left.
/// A missing node means an ancestor was deleted on that replica.
fn adjust_update_tree(tree: &mut UpdateTree, id: NodeId, conflicting: UpdateStatus) -> Result<()> {
    let Some(node) = tree.get(id) else {
        return Ok(());
    };
    let status = node.status.minus(conflicting);
    tree.execute(Operation::update(node.clone().with_status(status)))?;
    tree.remove_unchanged_leaves(id)
}

fn created_sibling(
    tree: &UpdateTree,
    parent_id: NodeId,
    model: &UpdateNodeModel,
) -> Option<UpdateNodeModel> {
    tree.children_named(parent_id, model.name())
        .find(|child| {
            child.node_type() == model.node_type() && child.status == UpdateStatus::CREATED
        })
        .cloned()
}

fn same_created_node(model: &UpdateNodeModel, other: &UpdateNodeModel) -> bool {
    match other.node_type() {
        NodeType::Directory => true,
        NodeType::File => model.attributes().same_content(other.attributes()),
    }
}

