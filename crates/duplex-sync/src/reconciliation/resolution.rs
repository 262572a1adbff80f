//! Conflict resolution and merging of the two sides

use crate::conflict::ConflictType;
use crate::naming::ConflictNaming;
use crate::state::SyncState;
use duplex_tree::{PropagationNodeModel, TreeNodeModel, UpdateNodeModel};
use duplex_types::{Error, FileNameFactory, Result, UpdateStatus};

const CREATED_OR_LINK_CHANGE: UpdateStatus = UpdateStatus::from_bits_truncate(
    UpdateStatus::CREATED.bits() | UpdateStatus::RENAMED.bits() | UpdateStatus::MOVED.bits(),
);

impl SyncState {
    /// Move a node out of a deleted or cyclic destination: back to its baseline
    /// location when that is still valid, otherwise to its sync root under a new name
    pub(crate) fn resolve_indirect_conflict(
        &self,
        model: UpdateNodeModel,
        conflict_type: ConflictType,
        naming: &ConflictNaming,
    ) -> Result<UpdateNodeModel> {
        match conflict_type {
            ConflictType::MoveParentDeleteDest | ConflictType::MoveMoveCycle => {
                self.undo_move(model, naming)
            }
            ConflictType::CreateParentDelete => {
                self.moved_to_sync_root(model, naming.delete_conflict.as_ref())
            }
            other => Err(Error::fault(format!("{} is not an indirect conflict", other))),
        }
    }

    fn undo_move(&self, mut model: UpdateNodeModel, naming: &ConflictNaming) -> Result<UpdateNodeModel> {
        let synced_node = self.synced.require(model.id())?;
        model.node.parent_id = synced_node.parent_id();
        model.node.name = synced_node.name().to_string();

        if self.destination_deleted(&model)?
            || self.is_cyclic_move(&model)
            || self.propagation_name_clash(&model).is_some()
        {
            return self.moved_to_sync_root(model, naming.delete_conflict.as_ref());
        }
        Ok(model)
    }

    /// `model` renamed by `factory` and placed in the first-level directory containing
    /// its destination. A first-level node stays where it is.
    pub(crate) fn moved_to_sync_root<M: TreeNodeModel>(
        &self,
        mut model: M,
        factory: &dyn FileNameFactory,
    ) -> Result<M> {
        let parent_id = if self.propagation.is_root(model.parent_id()) {
            model.parent_id()
        } else {
            self.sync_root_of(&model)?
        };
        let name = factory.name_for(model.id(), model.name(), model.node_type());
        let node = model.node_mut();
        node.parent_id = parent_id;
        node.name = name;
        Ok(model)
    }

    /// Undo a deletion that lost against an edit or a move
    pub(crate) fn resolve_delete_conflict(
        &self,
        model: PropagationNodeModel,
        conflict_type: ConflictType,
        naming: &ConflictNaming,
    ) -> Result<PropagationNodeModel> {
        match conflict_type {
            ConflictType::EditDelete | ConflictType::MoveDelete => Ok(restored(model)),
            ConflictType::EditParentDelete => {
                self.moved_to_sync_root(restored(model), naming.delete_conflict.as_ref())
            }
            other => Err(Error::fault(format!("{} is not a delete conflict", other))),
        }
    }

    /// Rename whichever of two clashing nodes loses. A losing `other` is saved to the
    /// Propagation Tree right away with the rename added to both statuses.
    pub(crate) fn resolve_name_clash(
        &mut self,
        mut model: PropagationNodeModel,
        other: PropagationNodeModel,
        naming: &ConflictNaming,
    ) -> Result<PropagationNodeModel> {
        let factory = naming.name_clash.as_ref();
        if !is_winner(&model, &other) {
            model.node.name = factory.name_for(model.id(), model.name(), model.node_type());
            return Ok(model);
        }

        let mut renamed = other;
        renamed.node.name = factory.name_for(renamed.id(), renamed.name(), renamed.node_type());
        renamed.remote_status = renamed.remote_status.union(UpdateStatus::RENAMED)?;
        renamed.local_status = renamed.local_status.union(UpdateStatus::RENAMED)?;
        self.apply_to_propagation(renamed)?;
        Ok(model)
    }

    /// Propagation Tree model combining both sides.
    ///
    /// The remote side provides the node unless it is unchanged or deleted; local
    /// renames, moves and edits then override it. `remote_status` keeps the remote
    /// changes and `local_status` the local ones.
    pub(crate) fn merged(
        &self,
        remote: &UpdateNodeModel,
        local: &UpdateNodeModel,
        backup_name: Option<String>,
    ) -> PropagationNodeModel {
        let mut node = if remote.status.is_unchanged() || remote.status.contains(UpdateStatus::DELETED) {
            local.node.clone()
        } else {
            let mut node = remote.node.clone();
            node.id = local.id();
            let status = local.status;
            if !status.is_unchanged() && !status.contains(UpdateStatus::DELETED) {
                if status.contains(UpdateStatus::EDITED) {
                    node.attributes.clone_from(local.attributes());
                }
                if status.contains(UpdateStatus::RENAMED) {
                    node.name = local.name().to_string();
                }
                if status.contains(UpdateStatus::MOVED) {
                    node.parent_id = local.parent_id();
                }
            }
            node
        };
        node.id = local.id();

        let alt_id = self
            .synced
            .get(local.id())
            .map_or(remote.id(), |synced_node| synced_node.alt_id);
        let mut model = PropagationNodeModel::new(node, alt_id)
            .with_statuses(remote.status, local.status);
        model.backup_name = backup_name;

        let restore = UpdateStatus::DELETED | UpdateStatus::RESTORE;
        if local.status.is_unchanged() && remote.status.contains(restore) {
            model.remote_status = UpdateStatus::UNCHANGED;
            model.local_status = UpdateStatus::CREATED | UpdateStatus::RESTORE;
        } else if remote.status.is_unchanged() && local.status.contains(restore) {
            model.local_status = UpdateStatus::UNCHANGED;
            model.remote_status = UpdateStatus::CREATED | UpdateStatus::RESTORE;
        }
        model
    }
}

/// Both sides renamed to different names or moved to different parents: the remote
/// link wins
pub(super) fn resolve_move_conflict(remote: &UpdateNodeModel, mut local: UpdateNodeModel) -> UpdateNodeModel {
    local.node.parent_id = remote.parent_id();
    local.node.name = remote.name().to_string();
    local
}

/// Both sides edited the file: the remote content wins and the local content is kept
/// under a backup name. Returns the local side without its edit and the backup name.
pub(super) fn resolve_edit_conflict(
    remote: &UpdateNodeModel,
    mut local: UpdateNodeModel,
    naming: &ConflictNaming,
) -> (UpdateNodeModel, String) {
    let backup_name = naming
        .edit_conflict
        .name_for(local.id(), local.name(), local.node_type());
    local.node.attributes.clone_from(remote.attributes());
    local.status = local.status.minus(UpdateStatus::EDITED);
    (local, backup_name)
}

/// The deleting side recreates the node instead
fn restored(mut model: PropagationNodeModel) -> PropagationNodeModel {
    let recreate = |deleted: UpdateStatus| {
        if deleted.contains(UpdateStatus::DELETED) {
            UpdateStatus::CREATED | UpdateStatus::RESTORE
        } else {
            UpdateStatus::UNCHANGED
        }
    };
    let remote_status = model.remote_status;
    model.remote_status = recreate(model.local_status);
    model.local_status = recreate(remote_status);
    model
}

/// Whether `model` keeps its name against `other`.
///
/// An unchanged existing node beats any incoming change, an unchanged incoming node
/// beats a changed existing one. Remote creations win, local creations lose, and
/// among moves the remote replica wins.
fn is_winner(model: &PropagationNodeModel, other: &PropagationNodeModel) -> bool {
    if other.is_unchanged() {
        return false;
    }
    if model.is_unchanged() {
        return true;
    }
    if model.remote_status.contains(UpdateStatus::CREATED) {
        return true;
    }
    if model.local_status.contains(UpdateStatus::CREATED) {
        return false;
    }
    if other.remote_status.contains_any(CREATED_OR_LINK_CHANGE) {
        return false;
    }
    model.remote_status.contains_any(UpdateStatus::RENAMED_AND_MOVED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_types::{NodeAttributes, NodeId, NodeType};
    use rstest::rstest;

    fn id(value: u64) -> NodeId {
        NodeId::new(value)
    }

    fn prop(remote: UpdateStatus, local: UpdateStatus) -> PropagationNodeModel {
        PropagationNodeModel::file(id(5), id(0), "f", id(105)).with_statuses(remote, local)
    }

    #[rstest]
    #[case(UpdateStatus::EDITED, UpdateStatus::DELETED, UpdateStatus::CREATED | UpdateStatus::RESTORE, UpdateStatus::UNCHANGED)]
    #[case(UpdateStatus::DELETED, UpdateStatus::MOVED, UpdateStatus::UNCHANGED, UpdateStatus::CREATED | UpdateStatus::RESTORE)]
    fn test_restore_recreates_on_deleting_side(
        #[case] remote: UpdateStatus,
        #[case] local: UpdateStatus,
        #[case] expected_remote: UpdateStatus,
        #[case] expected_local: UpdateStatus,
    ) {
        let model = restored(prop(remote, local));
        assert_eq!((model.remote_status, model.local_status), (expected_remote, expected_local));
    }

    #[rstest]
    #[case(UpdateStatus::UNCHANGED, UpdateStatus::UNCHANGED, UpdateStatus::RENAMED, UpdateStatus::UNCHANGED, true)]
    #[case(UpdateStatus::CREATED, UpdateStatus::UNCHANGED, UpdateStatus::UNCHANGED, UpdateStatus::UNCHANGED, false)]
    #[case(UpdateStatus::CREATED, UpdateStatus::UNCHANGED, UpdateStatus::UNCHANGED, UpdateStatus::CREATED, true)]
    #[case(UpdateStatus::UNCHANGED, UpdateStatus::CREATED, UpdateStatus::CREATED, UpdateStatus::UNCHANGED, false)]
    #[case(UpdateStatus::MOVED, UpdateStatus::UNCHANGED, UpdateStatus::UNCHANGED, UpdateStatus::RENAMED, true)]
    #[case(UpdateStatus::UNCHANGED, UpdateStatus::MOVED, UpdateStatus::RENAMED, UpdateStatus::UNCHANGED, false)]
    fn test_winner(
        #[case] remote: UpdateStatus,
        #[case] local: UpdateStatus,
        #[case] other_remote: UpdateStatus,
        #[case] other_local: UpdateStatus,
        #[case] expected: bool,
    ) {
        let model = prop(remote, local);
        let other = PropagationNodeModel::file(id(6), id(0), "f", id(106))
            .with_statuses(other_remote, other_local);
        assert_eq!(is_winner(&model, &other), expected);
    }

    #[test]
    fn test_merged_takes_local_link_over_remote_edit() {
        let state = SyncState::new();
        let remote = UpdateNodeModel::new(
            duplex_tree::NodeModel::new(id(5), id(0), "f", NodeType::File)
                .with_attributes(NodeAttributes::with_size(20)),
            UpdateStatus::EDITED,
        );
        let local = UpdateNodeModel::file(id(5), id(0), "g", UpdateStatus::RENAMED);

        let merged = state.merged(&remote, &local, None);
        assert_eq!(merged.name(), "g");
        assert_eq!(merged.attributes().size, Some(20));
        assert_eq!(merged.remote_status, UpdateStatus::EDITED);
        assert_eq!(merged.local_status, UpdateStatus::RENAMED);
    }

    #[test]
    fn test_merged_recreates_restored_node_deleted_again() {
        let state = SyncState::new();
        let remote = UpdateNodeModel::file(
            id(5),
            id(0),
            "f",
            UpdateStatus::DELETED | UpdateStatus::RESTORE,
        );
        let local = UpdateNodeModel::file(id(5), id(0), "f", UpdateStatus::UNCHANGED);

        let merged = state.merged(&remote, &local, None);
        assert_eq!(merged.remote_status, UpdateStatus::UNCHANGED);
        assert_eq!(merged.local_status, UpdateStatus::CREATED | UpdateStatus::RESTORE);
    }

    #[test]
    fn test_edit_conflict_keeps_local_content_under_backup_name() {
        let naming = ConflictNaming::default();
        let remote = UpdateNodeModel::new(
            duplex_tree::NodeModel::new(id(5), id(0), "f.txt", NodeType::File)
                .with_attributes(NodeAttributes::with_size(20)),
            UpdateStatus::EDITED,
        );
        let local = UpdateNodeModel::new(
            duplex_tree::NodeModel::new(id(5), id(0), "f.txt", NodeType::File)
                .with_attributes(NodeAttributes::with_size(30)),
            UpdateStatus::EDITED | UpdateStatus::RENAMED,
        );

        let (local, backup_name) = resolve_edit_conflict(&remote, local, &naming);
        assert_eq!(local.status, UpdateStatus::RENAMED);
        assert_eq!(local.attributes().size, Some(20));
        assert!(backup_name.contains("Edit conflict"));
        assert!(backup_name.ends_with(".txt"));
    }
}
