//! Node model shared by every tree kind

use duplex_types::{NodeAttributes, NodeId, NodeType};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Identity, link and attributes of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeModel {
    /// Id, unique within the tree
    pub id: NodeId,
    /// Id of the parent in the same tree
    pub parent_id: NodeId,
    /// Leaf name, unique among siblings
    pub name: String,
    /// File or directory
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// File metadata
    #[serde(default)]
    pub attributes: NodeAttributes,
}

impl NodeModel {
    /// Create a node model without attributes
    pub fn new(id: NodeId, parent_id: NodeId, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
            node_type,
            attributes: NodeAttributes::default(),
        }
    }

    /// The model every tree root starts with
    pub fn root() -> Self {
        Self::new(NodeId::ROOT, NodeId::ROOT, "", NodeType::Directory)
    }

    /// Set the attributes
    pub fn with_attributes(mut self, attributes: NodeAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// A node model that can live in a [`FileSystemTree`](crate::FileSystemTree)
pub trait TreeNodeModel: Clone + Debug {
    /// Type of the alternate identity indexed by the tree
    type AltId: Clone + Eq + Hash + Debug;

    /// Common part of the model
    fn node(&self) -> &NodeModel;

    /// Common part of the model, mutably
    fn node_mut(&mut self) -> &mut NodeModel;

    /// Alternate identity to index, if the node has one
    fn alt_id(&self) -> Option<&Self::AltId>;

    /// Copy the tree-specific metadata
    fn copy_metadata_from(&mut self, other: &Self);

    /// Compare the tree-specific metadata
    fn metadata_equals(&self, other: &Self) -> bool;

    /// Node id
    fn id(&self) -> NodeId {
        self.node().id
    }

    /// Parent id
    fn parent_id(&self) -> NodeId {
        self.node().parent_id
    }

    /// Leaf name
    fn name(&self) -> &str {
        &self.node().name
    }

    /// Node type
    fn node_type(&self) -> NodeType {
        self.node().node_type
    }

    /// Check whether the node is a directory
    fn is_directory(&self) -> bool {
        self.node_type().is_directory()
    }

    /// File metadata
    fn attributes(&self) -> &NodeAttributes {
        &self.node().attributes
    }

    /// Copy parent and name
    fn copy_link_from(&mut self, other: &Self) {
        let source = other.node();
        let node = self.node_mut();
        node.parent_id = source.parent_id;
        node.name.clone_from(&source.name);
    }

    /// Copy the file metadata
    fn copy_attributes_from(&mut self, other: &Self) {
        self.node_mut().attributes.clone_from(&other.node().attributes);
    }

    /// Compare parent and name
    fn link_equals(&self, other: &Self) -> bool {
        self.parent_id() == other.parent_id() && self.name() == other.name()
    }

    /// Compare the file metadata
    fn attributes_equal(&self, other: &Self) -> bool {
        self.attributes() == other.attributes()
    }
}
