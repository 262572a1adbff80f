//! Update Trees: pending changes of one replica since the Synced Tree baseline

use crate::model::{NodeModel, TreeNodeModel};
use crate::tree::FileSystemTree;
use duplex_types::{NodeId, NodeType, Replica, UpdateStatus};
use serde::{Deserialize, Serialize};

/// Update Tree node, identified by its own replica's id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNodeModel {
    /// Common node part
    #[serde(flatten)]
    pub node: NodeModel,
    /// Change status since the baseline
    #[serde(default)]
    pub status: UpdateStatus,
}

impl UpdateNodeModel {
    /// Create a model
    pub const fn new(node: NodeModel, status: UpdateStatus) -> Self {
        Self { node, status }
    }

    /// Directory model
    pub fn directory(id: NodeId, parent_id: NodeId, name: impl Into<String>, status: UpdateStatus) -> Self {
        Self::new(NodeModel::new(id, parent_id, name, NodeType::Directory), status)
    }

    /// File model
    pub fn file(id: NodeId, parent_id: NodeId, name: impl Into<String>, status: UpdateStatus) -> Self {
        Self::new(NodeModel::new(id, parent_id, name, NodeType::File), status)
    }

    /// Copy with another status
    pub fn with_status(mut self, status: UpdateStatus) -> Self {
        self.status = status;
        self
    }

    /// Copy with another id
    pub const fn with_id(mut self, id: NodeId) -> Self {
        self.node.id = id;
        self
    }

    /// Copy with another parent id
    pub const fn with_parent_id(mut self, parent_id: NodeId) -> Self {
        self.node.parent_id = parent_id;
        self
    }

    /// Copy with another name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.node.name = name.into();
        self
    }
}

impl TreeNodeModel for UpdateNodeModel {
    type AltId = NodeId;

    fn node(&self) -> &NodeModel {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeModel {
        &mut self.node
    }

    fn alt_id(&self) -> Option<&NodeId> {
        None
    }

    fn copy_metadata_from(&mut self, other: &Self) {
        self.status = other.status;
    }

    fn metadata_equals(&self, other: &Self) -> bool {
        self.status == other.status
    }
}

/// Tree of [`UpdateNodeModel`]
pub type UpdateTree = FileSystemTree<UpdateNodeModel>;

impl Default for UpdateTree {
    fn default() -> Self {
        Self::new("Update Tree", UpdateNodeModel::new(NodeModel::root(), UpdateStatus::UNCHANGED))
    }
}

impl UpdateTree {
    /// Empty Update Tree of `replica`
    pub fn for_replica(replica: Replica) -> Self {
        let label = match replica {
            Replica::Remote => "Remote Update Tree",
            Replica::Local => "Local Update Tree",
        };
        Self::new(label, UpdateNodeModel::new(NodeModel::root(), UpdateStatus::UNCHANGED))
    }

    /// Remove `start` and its ancestors while they are Unchanged leaves
    pub fn remove_unchanged_leaves(&mut self, start: NodeId) -> duplex_types::Result<()> {
        self.remove_leaves_while(start, |model| model.status.is_unchanged())
    }
}
