//! Propagation Tree: merged, conflict-resolved changes still to be applied

use crate::model::{NodeModel, TreeNodeModel};
use crate::synced::SyncedNodeModel;
use crate::tree::FileSystemTree;
use duplex_types::{NodeId, NodeType, UpdateStatus};
use serde::{Deserialize, Serialize};

/// Propagation Tree node.
///
/// `remote_status` holds the changes detected on the remote replica, which are to be
/// applied locally; `local_status` holds the changes detected on the local replica,
/// which are to be applied remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationNodeModel {
    /// Common node part, in the local id space
    #[serde(flatten)]
    pub node: NodeModel,
    /// Remote id
    pub alt_id: NodeId,
    /// Changes detected on the remote replica
    #[serde(default)]
    pub remote_status: UpdateStatus,
    /// Changes detected on the local replica
    #[serde(default)]
    pub local_status: UpdateStatus,
    /// Name under which the local content is preserved before being overwritten
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,
}

impl PropagationNodeModel {
    /// Create a model with both statuses Unchanged
    pub const fn new(node: NodeModel, alt_id: NodeId) -> Self {
        Self {
            node,
            alt_id,
            remote_status: UpdateStatus::UNCHANGED,
            local_status: UpdateStatus::UNCHANGED,
            backup_name: None,
        }
    }

    /// Directory model
    pub fn directory(id: NodeId, parent_id: NodeId, name: impl Into<String>, alt_id: NodeId) -> Self {
        Self::new(NodeModel::new(id, parent_id, name, NodeType::Directory), alt_id)
    }

    /// File model
    pub fn file(id: NodeId, parent_id: NodeId, name: impl Into<String>, alt_id: NodeId) -> Self {
        Self::new(NodeModel::new(id, parent_id, name, NodeType::File), alt_id)
    }

    /// Copy with other statuses
    pub fn with_statuses(mut self, remote_status: UpdateStatus, local_status: UpdateStatus) -> Self {
        self.remote_status = remote_status;
        self.local_status = local_status;
        self
    }

    /// True when neither replica changed the node
    pub fn is_unchanged(&self) -> bool {
        self.remote_status.is_unchanged() && self.local_status.is_unchanged()
    }

    /// True when either replica deleted the node
    pub fn is_deleted(&self) -> bool {
        self.remote_status.contains(UpdateStatus::DELETED)
            || self.local_status.contains(UpdateStatus::DELETED)
    }

    /// True when either status has every bit of `status`
    pub fn either_contains(&self, status: UpdateStatus) -> bool {
        self.remote_status.contains(status) || self.local_status.contains(status)
    }
}

impl From<&SyncedNodeModel> for PropagationNodeModel {
    fn from(model: &SyncedNodeModel) -> Self {
        Self::new(model.node.clone(), model.alt_id)
    }
}

impl TreeNodeModel for PropagationNodeModel {
    type AltId = NodeId;

    fn node(&self) -> &NodeModel {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeModel {
        &mut self.node
    }

    fn alt_id(&self) -> Option<&NodeId> {
        Some(&self.alt_id)
    }

    fn copy_metadata_from(&mut self, other: &Self) {
        self.alt_id = other.alt_id;
        self.remote_status = other.remote_status;
        self.local_status = other.local_status;
        self.backup_name.clone_from(&other.backup_name);
    }

    fn metadata_equals(&self, other: &Self) -> bool {
        self.alt_id == other.alt_id
            && self.remote_status == other.remote_status
            && self.local_status == other.local_status
            && self.backup_name == other.backup_name
    }
}

/// Tree of [`PropagationNodeModel`]
pub type PropagationTree = FileSystemTree<PropagationNodeModel>;

impl Default for PropagationTree {
    fn default() -> Self {
        Self::new("Propagation Tree", PropagationNodeModel::new(NodeModel::root(), NodeId::ROOT))
    }
}

impl PropagationTree {
    /// Remove `start` and its ancestors while they are leaves with both statuses Unchanged
    pub fn remove_unchanged_leaves(&mut self, start: NodeId) -> duplex_types::Result<()> {
        self.remove_leaves_while(start, PropagationNodeModel::is_unchanged)
    }
}
