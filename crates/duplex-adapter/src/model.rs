//! Adapter Tree node model and branch queries

use crate::status::AdapterNodeStatus;
use duplex_tree::{FileSystemTree, NodeModel, TreeNodeModel};
use duplex_types::{ExternalId, FileAttributes, NodeAttributes, NodeId, NodeInfo, NodeType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A node of the Adapter Tree: a replica item as last observed, with dirty flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterNodeModel {
    /// Common part of the model
    #[serde(flatten)]
    pub node: NodeModel,
    /// Identity of the item on its replica volume; absent for placeholders and the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_id: Option<ExternalId>,
    /// Dirty flags and state markers
    #[serde(default)]
    pub status: AdapterNodeStatus,
    /// Local counter bumped whenever the file content changes
    #[serde(default)]
    pub content_version: u64,
}

impl AdapterNodeModel {
    /// Wrap a node model without alt id or flags
    pub fn new(node: NodeModel) -> Self {
        Self {
            node,
            alt_id: None,
            status: AdapterNodeStatus::NONE,
            content_version: 0,
        }
    }

    /// Create a directory model
    pub fn directory(id: NodeId, parent_id: NodeId, name: impl Into<String>) -> Self {
        Self::new(NodeModel::new(id, parent_id, name, NodeType::Directory))
    }

    /// Create a file model
    pub fn file(id: NodeId, parent_id: NodeId, name: impl Into<String>, attributes: NodeAttributes) -> Self {
        Self::new(NodeModel::new(id, parent_id, name, NodeType::File).with_attributes(attributes))
    }

    /// Model of a replica item reported under `parent_id`; the id is left unassigned
    pub fn from_info(info: &NodeInfo, parent_id: NodeId, volume_id: u64) -> Self {
        let attributes = if info.is_directory() {
            NodeAttributes::default()
        } else {
            NodeAttributes {
                revision_id: info.revision_id.clone(),
                last_write_time: info.last_write_time,
                size: info.size,
                size_on_storage: info.size_on_storage,
            }
        };
        let mut model = Self::new(
            NodeModel::new(NodeId::ROOT, parent_id, info.name.clone(), info.node_type())
                .with_attributes(attributes),
        );
        model.alt_id = info
            .id
            .as_ref()
            .filter(|id| !id.is_empty())
            .map(|id| ExternalId::new(volume_id, id.clone()));
        model
    }

    /// Set the alt id
    #[must_use]
    pub fn with_alt_id(mut self, alt_id: Option<ExternalId>) -> Self {
        self.alt_id = alt_id;
        self
    }

    /// Replace the status
    #[must_use]
    pub const fn with_status(mut self, status: AdapterNodeStatus) -> Self {
        self.status = status;
        self
    }

    /// Add status flags
    #[must_use]
    pub const fn with_flags(mut self, flags: AdapterNodeStatus) -> Self {
        self.status = self.status.with(flags);
        self
    }

    /// Clear status flags
    #[must_use]
    pub const fn without_flags(mut self, flags: AdapterNodeStatus) -> Self {
        self.status = self.status.without(flags);
        self
    }

    /// Set the id
    #[must_use]
    pub const fn with_id(mut self, id: NodeId) -> Self {
        self.node.id = id;
        self
    }

    /// Set the parent id
    #[must_use]
    pub const fn with_parent_id(mut self, parent_id: NodeId) -> Self {
        self.node.parent_id = parent_id;
        self
    }

    /// Existence not yet confirmed by the replica
    pub const fn is_dirty_placeholder(&self) -> bool {
        self.status.contains(AdapterNodeStatus::DIRTY_PLACEHOLDER)
    }

    /// Metadata needs refresh
    pub const fn has_dirty_attributes(&self) -> bool {
        self.status.contains(AdapterNodeStatus::DIRTY_ATTRIBUTES)
    }

    /// Directory listing needs refresh
    pub const fn has_dirty_children(&self) -> bool {
        self.status.contains(AdapterNodeStatus::DIRTY_CHILDREN)
    }

    /// Subtree needs deep refresh
    pub const fn has_dirty_descendants(&self) -> bool {
        self.status.contains(AdapterNodeStatus::DIRTY_DESCENDANTS)
    }

    /// Removed while the branch was dirty
    pub const fn is_dirty_deleted(&self) -> bool {
        self.status.contains(AdapterNodeStatus::DIRTY_DELETED)
    }

    /// Parent unknown or node deleted
    pub const fn is_lost_or_deleted(&self) -> bool {
        self.status
            .contains_any(AdapterNodeStatus::DIRTY_PARENT.with(AdapterNodeStatus::DIRTY_DELETED))
    }

    /// The subtree below this node can be trusted as a base for enumeration
    pub const fn starts_stable_branch(&self) -> bool {
        !self.has_dirty_descendants() && !self.is_lost_or_deleted() && !self.is_dirty_placeholder()
    }
}

impl TreeNodeModel for AdapterNodeModel {
    type AltId = ExternalId;

    fn node(&self) -> &NodeModel {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeModel {
        &mut self.node
    }

    fn alt_id(&self) -> Option<&ExternalId> {
        self.alt_id.as_ref()
    }

    fn copy_metadata_from(&mut self, other: &Self) {
        self.alt_id.clone_from(&other.alt_id);
        self.status = other.status;
        self.content_version = other.content_version;
    }

    fn metadata_equals(&self, other: &Self) -> bool {
        self.alt_id == other.alt_id
            && self.status == other.status
            && self.content_version == other.content_version
    }
}

/// Last known state of one replica
pub type AdapterTree = FileSystemTree<AdapterNodeModel>;

/// Create an empty Adapter Tree for the named replica
pub fn adapter_tree(label: &'static str) -> AdapterTree {
    AdapterTree::new(label, AdapterNodeModel::new(NodeModel::root()))
}

/// Branch queries over an Adapter Tree
pub trait AdapterTreeExt {
    /// The node is a direct child of the tree root
    fn is_sync_root(&self, id: NodeId) -> bool;

    /// Sync root the node belongs to
    fn sync_root_of(&self, id: NodeId) -> Option<NodeId>;

    /// The node or one of its ancestors is marked deleted
    fn is_node_or_branch_deleted(&self, id: NodeId) -> bool;

    /// The node is a placeholder or lies below a directory awaiting deep refresh
    fn is_branch_dirty(&self, id: NodeId) -> bool;

    /// Every ancestor of the node starts a stable branch
    fn is_branch_stable(&self, id: NodeId) -> bool;

    /// Volume of the first node with an alt id, from the node upward
    fn volume_id(&self, id: NodeId) -> Option<u64>;

    /// Path of the node relative to its sync root
    fn relative_path(&self, id: NodeId) -> PathBuf;

    /// Replica item description of the node, for file-system calls
    fn node_info(&self, id: NodeId) -> Option<NodeInfo>;
}

impl AdapterTreeExt for AdapterTree {
    fn is_sync_root(&self, id: NodeId) -> bool {
        !self.is_root(id) && self.get(id).is_some_and(|model| self.is_root(model.parent_id()))
    }

    fn sync_root_of(&self, id: NodeId) -> Option<NodeId> {
        if self.is_root(id) {
            return None;
        }
        let mut current = self.get(id)?;
        while !self.is_root(current.parent_id()) {
            current = self.get(current.parent_id())?;
        }
        Some(current.id())
    }

    fn is_node_or_branch_deleted(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(AdapterNodeModel::is_dirty_deleted)
            || self.ancestors(id).any(AdapterNodeModel::is_dirty_deleted)
    }

    fn is_branch_dirty(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(AdapterNodeModel::is_dirty_placeholder)
            || self.ancestors(id).any(AdapterNodeModel::has_dirty_descendants)
    }

    fn is_branch_stable(&self, id: NodeId) -> bool {
        self.ancestors(id)
            .filter(|model| !self.is_root(model.id()))
            .all(AdapterNodeModel::starts_stable_branch)
    }

    fn volume_id(&self, id: NodeId) -> Option<u64> {
        self.get(id)
            .into_iter()
            .chain(self.ancestors(id))
            .filter(|model| !self.is_root(model.id()))
            .find_map(|model| model.alt_id.as_ref().map(|alt| alt.volume_id))
    }

    fn relative_path(&self, id: NodeId) -> PathBuf {
        let mut names: Vec<&str> = self
            .get(id)
            .into_iter()
            .chain(self.ancestors(id))
            .take_while(|model| !self.is_root(model.parent_id()) && !self.is_root(model.id()))
            .map(TreeNodeModel::name)
            .collect();
        names.reverse();
        names.into_iter().collect()
    }

    fn node_info(&self, id: NodeId) -> Option<NodeInfo> {
        let model = self.get(id)?;
        let parent_id = self
            .parent(id)
            .and_then(|parent| parent.alt_id.as_ref())
            .map(|alt| alt.item_id.clone());
        let attributes = model.attributes();
        Some(NodeInfo {
            id: model.alt_id.as_ref().map(|alt| alt.item_id.clone()),
            parent_id,
            name: model.name().to_owned(),
            path: Some(self.relative_path(id)),
            attributes: if model.is_directory() {
                FileAttributes::DIRECTORY
            } else {
                FileAttributes::NONE
            },
            revision_id: attributes.revision_id.clone(),
            last_write_time: attributes.last_write_time,
            size: attributes.size,
            size_on_storage: attributes.size_on_storage,
            ..NodeInfo::default()
        })
    }
}
