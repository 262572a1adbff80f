//! Update Tree ancestors copied from the Synced Tree

use duplex_tree::{
    Operation, OperationType, SyncedNodeModel, SyncedTree, TreeNodeModel, UpdateNodeModel,
    UpdateTree,
};
use duplex_types::{Error, NodeId, Replica, Result, UpdateStatus};

/// `operation` preceded by the Creates of any Update Tree ancestors its target parent
/// is missing.
///
/// Only Create and Move operations need a parent. A deleted ancestor is a fault: nothing
/// can be created or moved into a deleted branch of the Update Tree.
pub(crate) fn with_missing_ancestors(
    replica: Replica,
    synced: &SyncedTree,
    updates: &UpdateTree,
    operation: Operation<UpdateNodeModel>,
) -> Result<Vec<Operation<UpdateNodeModel>>> {
    let mut operations = match operation.kind {
        OperationType::Create | OperationType::Move => {
            missing_ancestors(replica, synced, updates, operation.model.parent_id())?
        }
        _ => Vec::new(),
    };
    operations.push(operation);
    Ok(operations)
}

/// Creates for the Update Tree node `id` and its missing ancestors, top-down
fn missing_ancestors(
    replica: Replica,
    synced: &SyncedTree,
    updates: &UpdateTree,
    id: NodeId,
) -> Result<Vec<Operation<UpdateNodeModel>>> {
    if let Some(node) = updates.get(id) {
        if node.status.contains(UpdateStatus::DELETED) {
            return Err(Error::fault(format!(
                "{}: node Id={} status is Deleted",
                updates.label(),
                id
            )));
        }
        return Ok(Vec::new());
    }

    let mut synced_node = synced
        .by_own_id(id, replica)
        .ok_or_else(|| Error::missing_node(synced.label(), id))?;
    let mut chain = Vec::new();
    let mut existing = None;
    while existing.is_none() && !synced.is_root(synced_node.id()) {
        chain.push(synced_node);
        synced_node = synced.require(synced_node.parent_id())?;
        existing = updates.get(synced_node.own_id(replica));
    }

    if let Some(parent) = existing {
        if parent.status.contains(UpdateStatus::DELETED) {
            return Err(Error::fault(format!(
                "{}: parent node Id={} status is Deleted",
                updates.label(),
                parent.id()
            )));
        }
    }

    chain
        .into_iter()
        .rev()
        .map(|node| Ok(Operation::create(unchanged_copy(replica, synced, node)?)))
        .collect()
}

/// Update Tree model of a Synced Tree node, in `replica` ids, with no change
fn unchanged_copy(
    replica: Replica,
    synced: &SyncedTree,
    node: &SyncedNodeModel,
) -> Result<UpdateNodeModel> {
    let parent = synced.require(node.parent_id())?;
    Ok(UpdateNodeModel::new(node.node.clone(), UpdateStatus::UNCHANGED)
        .with_id(node.own_id(replica))
        .with_parent_id(parent.own_id(replica)))
}
