//! Conflict detection and the Propagation Tree queries it relies on

use crate::conflict::ConflictType;
use crate::state::SyncState;
use duplex_tree::{PropagationNodeModel, TreeNodeModel, UpdateNodeModel};
use duplex_types::{Error, NodeId, Result, UpdateStatus};
use tracing::warn;

const LINK_CHANGE: UpdateStatus = UpdateStatus::RENAMED_AND_MOVED;

impl SyncState {
    /// Conflict of one side with the other replica's tree structure: a move or rename
    /// into a deleted branch, a creation under a deleted parent, or a move creating
    /// a cycle
    pub(crate) fn indirect_conflict(&self, model: &UpdateNodeModel) -> Result<Option<ConflictType>> {
        let status = model.status;
        if status.contains_any(LINK_CHANGE) && self.destination_deleted(model)? {
            return Ok(Some(ConflictType::MoveParentDeleteDest));
        }
        if status.contains(UpdateStatus::CREATED) && self.destination_deleted(model)? {
            return Ok(Some(ConflictType::CreateParentDelete));
        }
        if status.contains(UpdateStatus::MOVED) && self.is_cyclic_move(model) {
            warn!(
                "Move of node Id={} under {} would create a cycle",
                model.id(),
                model.parent_id()
            );
            return Ok(Some(ConflictType::MoveMoveCycle));
        }
        Ok(None)
    }

    /// Whether the nearest Propagation Tree ancestor of the destination of `model`, or
    /// any of its ancestors, is deleted.
    ///
    /// A destination missing from the Propagation Tree is looked up in the Synced Tree,
    /// and its baseline ancestors are walked until one is found in the Propagation Tree.
    pub(crate) fn destination_deleted<M: TreeNodeModel>(&self, model: &M) -> Result<bool> {
        let parent_id = model.parent_id();
        let mut ancestor = if self.propagation.contains(parent_id) {
            parent_id
        } else {
            if !self.synced.contains(parent_id) {
                return Err(Error::fault(format!(
                    "Parent Id={} of node Id={} exists in neither {} nor {}",
                    parent_id,
                    model.id(),
                    self.propagation.label(),
                    self.synced.label()
                )));
            }
            self.synced
                .ancestors(parent_id)
                .map(TreeNodeModel::id)
                .find(|id| self.propagation.contains(*id))
                .unwrap_or_else(|| self.propagation.root_id())
        };

        while !self.propagation.is_root(ancestor) {
            let node = self.propagation.require(ancestor)?;
            if node.is_deleted() {
                return Ok(true);
            }
            ancestor = node.parent_id();
        }
        Ok(false)
    }

    /// Whether the destination of `model` lies inside its own branch. The path is
    /// followed through the Propagation Tree where it has the node and through the
    /// Synced Tree otherwise.
    pub(crate) fn is_cyclic_move<M: TreeNodeModel>(&self, model: &M) -> bool {
        let limit = self.propagation.len() + self.synced.len();
        let mut current = model.parent_id();
        for _ in 0..limit {
            if current == model.id() {
                return true;
            }
            if self.propagation.is_root(current) {
                return false;
            }
            let parent = self
                .propagation
                .get(current)
                .map(TreeNodeModel::parent_id)
                .or_else(|| self.synced.get(current).map(TreeNodeModel::parent_id));
            match parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        warn!("Path of node Id={} does not reach the root", model.id());
        true
    }

    /// The first-level directory containing the destination of `model`
    pub(crate) fn sync_root_of<M: TreeNodeModel>(&self, model: &M) -> Result<NodeId> {
        if self.propagation.is_root(model.parent_id()) {
            return Err(Error::fault(format!(
                "Node Id={} is a sync root and has no sync root ancestor",
                model.id()
            )));
        }
        let limit = self.propagation.len() + self.synced.len();
        let mut current = model.parent_id();
        for _ in 0..limit {
            let parent_id = match self.propagation.get(current) {
                Some(node) => node.parent_id(),
                None => self.synced.require(current)?.parent_id(),
            };
            if self.propagation.is_root(parent_id) {
                return Ok(current);
            }
            current = parent_id;
        }
        Err(Error::fault(format!(
            "Path of node Id={} does not reach the root",
            model.id()
        )))
    }

    /// A not deleted Propagation Tree sibling taking the name of `model`
    pub(crate) fn propagation_name_clash<M: TreeNodeModel>(
        &self,
        model: &M,
    ) -> Option<PropagationNodeModel> {
        self.propagation
            .children_named(model.parent_id(), model.name())
            .find(|node| node.id() != model.id() && !node.is_deleted())
            .cloned()
    }

    /// A node sharing the name and the parent of a created, renamed or moved node.
    ///
    /// Besides the Propagation Tree, a node renamed on one replica and moved on the
    /// other can clash with an untouched Synced Tree node.
    pub(crate) fn name_clash_conflict(
        &self,
        model: &PropagationNodeModel,
    ) -> Option<(ConflictType, PropagationNodeModel)> {
        if !model.remote_status.contains_any(CHANGED_LOCATION)
            && !model.local_status.contains_any(CHANGED_LOCATION)
        {
            return None;
        }
        let other = self
            .propagation_name_clash(model)
            .or_else(|| self.synced_name_clash(model))?;

        let created = |node: &PropagationNodeModel| node.either_contains(UpdateStatus::CREATED);
        let moved = |node: &PropagationNodeModel| {
            node.remote_status.contains_any(LINK_CHANGE) || node.local_status.contains_any(LINK_CHANGE)
        };
        let conflict_type = if created(model) && created(&other) {
            ConflictType::CreateCreate
        } else if (created(model) && moved(&other)) || (moved(model) && created(&other)) {
            ConflictType::MoveCreate
        } else {
            ConflictType::MoveMoveDest
        };
        Some((conflict_type, other))
    }

    fn synced_name_clash(&self, model: &PropagationNodeModel) -> Option<PropagationNodeModel> {
        let crossed = (model.local_status.contains(UpdateStatus::RENAMED)
            && model.remote_status.contains(UpdateStatus::MOVED))
            || (model.local_status.contains(UpdateStatus::MOVED)
                && model.remote_status.contains(UpdateStatus::RENAMED));
        if !crossed {
            return None;
        }
        self.synced
            .children_named(model.parent_id(), model.name())
            .find(|node| node.id() != model.id() && !self.propagation.contains(node.id()))
            .map(PropagationNodeModel::from)
    }

    /// Deletion on one replica against an edit or a move on the other
    pub(crate) fn delete_conflict(&self, model: &PropagationNodeModel) -> Option<ConflictType> {
        let remote = model.remote_status;
        let local = model.local_status;
        let deleted = UpdateStatus::DELETED;

        if (remote.contains_any(LINK_CHANGE) && local.contains(deleted))
            || (local.contains_any(LINK_CHANGE) && remote.contains(deleted))
        {
            return Some(ConflictType::MoveDelete);
        }
        let edited = UpdateStatus::EDITED;
        if (remote.contains(edited) && local.contains(deleted))
            || (remote.contains(deleted) && local.contains(edited))
        {
            if self.remote_parent_deleted(model) || self.local_parent_deleted(model) {
                return Some(ConflictType::EditParentDelete);
            }
            return Some(ConflictType::EditDelete);
        }
        None
    }

    /// Deleted remotely through an ancestor rather than directly
    fn remote_parent_deleted(&self, model: &PropagationNodeModel) -> bool {
        model.remote_status.contains(UpdateStatus::DELETED)
            && !self
                .remote_updates
                .get(model.alt_id)
                .is_some_and(|node| node.status.contains(UpdateStatus::DELETED))
    }

    /// Deleted locally through an ancestor rather than directly
    fn local_parent_deleted(&self, model: &PropagationNodeModel) -> bool {
        model.local_status == UpdateStatus::DELETED
            && !self
                .local_updates
                .get(model.id())
                .is_some_and(|node| node.status.contains(UpdateStatus::DELETED))
    }
}

const CHANGED_LOCATION: UpdateStatus = UpdateStatus::from_bits_truncate(
    UpdateStatus::CREATED.bits() | UpdateStatus::RENAMED.bits() | UpdateStatus::MOVED.bits(),
);

/// Both sides renamed the node to different names or moved it to different parents
pub(super) fn move_conflict(remote: &UpdateNodeModel, local: &UpdateNodeModel) -> Option<ConflictType> {
    let renamed = UpdateStatus::RENAMED;
    let moved = UpdateStatus::MOVED;
    if remote.status.contains(renamed) && local.status.contains(renamed) && remote.name() != local.name() {
        return Some(ConflictType::MoveMoveSource);
    }
    if remote.status.contains(moved)
        && local.status.contains(moved)
        && remote.parent_id() != local.parent_id()
    {
        return Some(ConflictType::MoveMoveSource);
    }
    None
}

/// Both sides edited the same file
pub(super) fn edit_conflict(remote: &UpdateNodeModel, local: &UpdateNodeModel) -> Option<ConflictType> {
    let files = !remote.is_directory() && !local.is_directory();
    (files
        && remote.status.contains(UpdateStatus::EDITED)
        && local.status.contains(UpdateStatus::EDITED))
    .then_some(ConflictType::EditEdit)
}
