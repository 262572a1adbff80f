//! Synced Tree: the last state both replicas agreed on

use crate::model::{NodeModel, TreeNodeModel};
use crate::tree::FileSystemTree;
use duplex_types::{NodeId, NodeType, Replica};
use serde::{Deserialize, Serialize};

/// Synced Tree node. `id` is the local id, `alt_id` the remote id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedNodeModel {
    /// Common node part
    #[serde(flatten)]
    pub node: NodeModel,
    /// Remote id
    pub alt_id: NodeId,
}

impl SyncedNodeModel {
    /// Create a model
    pub const fn new(node: NodeModel, alt_id: NodeId) -> Self {
        Self { node, alt_id }
    }

    /// Directory model
    pub fn directory(id: NodeId, parent_id: NodeId, name: impl Into<String>, alt_id: NodeId) -> Self {
        Self::new(NodeModel::new(id, parent_id, name, NodeType::Directory), alt_id)
    }

    /// File model
    pub fn file(id: NodeId, parent_id: NodeId, name: impl Into<String>, alt_id: NodeId) -> Self {
        Self::new(NodeModel::new(id, parent_id, name, NodeType::File), alt_id)
    }

    /// Id of the node on `replica`
    pub const fn own_id(&self, replica: Replica) -> NodeId {
        match replica {
            Replica::Local => self.node.id,
            Replica::Remote => self.alt_id,
        }
    }

    /// Id of the node on the replica other than `replica`
    pub const fn other_id(&self, replica: Replica) -> NodeId {
        self.own_id(replica.other())
    }
}

impl TreeNodeModel for SyncedNodeModel {
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
    }

    fn metadata_equals(&self, other: &Self) -> bool {
        self.alt_id == other.alt_id
    }
}

/// Tree of [`SyncedNodeModel`]
pub type SyncedTree = FileSystemTree<SyncedNodeModel>;

impl Default for SyncedTree {
    fn default() -> Self {
        Self::new("Synced Tree", SyncedNodeModel::new(NodeModel::root(), NodeId::ROOT))
    }
}

impl SyncedTree {
    /// Node by its id on `replica`
    pub fn by_own_id(&self, id: NodeId, replica: Replica) -> Option<&SyncedNodeModel> {
        match replica {
            Replica::Local => self.get(id),
            Replica::Remote => self.by_alt_id(&id),
        }
    }
}
