//! Tree operations and the minimal operation set between two models

use crate::model::TreeNodeModel;
use duplex_types::{Error, Result};
use serde::{Deserialize, Serialize};

/// Kind of structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// Insert a node under an existing directory
    Create,
    /// Replace attributes and metadata
    Edit,
    /// Replace parent, name and metadata
    Move,
    /// Replace metadata only
    Update,
    /// Remove the node and its subtree
    Delete,
}

/// A change to apply to a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation<M> {
    /// Kind of change
    pub kind: OperationType,
    /// Target model; only the parts relevant to `kind` are used
    pub model: M,
}

impl<M> Operation<M> {
    /// Create an operation
    pub const fn new(kind: OperationType, model: M) -> Self {
        Self { kind, model }
    }

    /// Create operation
    pub const fn create(model: M) -> Self {
        Self::new(OperationType::Create, model)
    }

    /// Edit operation
    pub const fn edit(model: M) -> Self {
        Self::new(OperationType::Edit, model)
    }

    /// Move operation
    pub const fn moved(model: M) -> Self {
        Self::new(OperationType::Move, model)
    }

    /// Update operation
    pub const fn update(model: M) -> Self {
        Self::new(OperationType::Update, model)
    }

    /// Delete operation
    pub const fn delete(model: M) -> Self {
        Self::new(OperationType::Delete, model)
    }
}

/// Operations that turn `current` into `incoming`.
///
/// A link change yields a Move and an attribute change an Edit, both carrying the
/// incoming metadata. An Update is emitted only when neither applied and the metadata
/// differs. Changing the node type of an existing node is a fault.
pub fn equalize_operations<M: TreeNodeModel>(
    current: Option<&M>,
    incoming: Option<&M>,
) -> Result<Vec<Operation<M>>> {
    let (current, incoming) = match (current, incoming) {
        (None, None) => return Ok(Vec::new()),
        (None, Some(incoming)) => return Ok(vec![Operation::create(incoming.clone())]),
        (Some(current), None) => return Ok(vec![Operation::delete(current.clone())]),
        (Some(current), Some(incoming)) => (current, incoming),
    };

    if current.node_type() != incoming.node_type() {
        return Err(Error::fault(format!(
            "Cannot change type of node Id={} from {:?} to {:?}",
            current.id(),
            current.node_type(),
            incoming.node_type()
        )));
    }

    let mut operations = Vec::new();
    if !current.link_equals(incoming) {
        let mut model = current.clone();
        model.copy_link_from(incoming);
        model.copy_metadata_from(incoming);
        operations.push(Operation::moved(model));
    }
    if !current.attributes_equal(incoming) {
        let mut model = current.clone();
        model.copy_attributes_from(incoming);
        model.copy_metadata_from(incoming);
        operations.push(Operation::edit(model));
    }
    if operations.is_empty() && !current.metadata_equals(incoming) {
        let mut model = current.clone();
        model.copy_metadata_from(incoming);
        operations.push(Operation::update(model));
    }

    Ok(operations)
}
