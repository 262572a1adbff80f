//! Consolidated status and the Update Tree operation of a detected update

use duplex_tree::{
    NodeModel, Operation, OperationType, SyncedNodeModel, SyncedTree, TreeNodeModel,
    UpdateNodeModel,
};
use duplex_types::{Error, NodeId, Replica, Result, UpdateStatus};

/// Parent of a Synced Tree node, in `replica` ids
pub(crate) fn synced_parent_id(
    replica: Replica,
    synced: &SyncedTree,
    node: &SyncedNodeModel,
) -> Result<NodeId> {
    Ok(synced.require(node.parent_id())?.own_id(replica))
}

/// Status the Update Tree node takes after `update`, relative to the baseline
pub(super) fn consolidated_status(
    replica: Replica,
    synced: &SyncedTree,
    update: &Operation<NodeModel>,
    node: Option<&UpdateNodeModel>,
    synced_node: Option<&SyncedNodeModel>,
) -> Result<UpdateStatus> {
    let id = update.model.id;
    if update.kind != OperationType::Create && node.is_none() && synced_node.is_none() {
        return Err(Error::fault(format!(
            "Unable to consolidate {:?} operation, node Id={} exists in neither Synced Tree nor Update Tree",
            update.kind, id
        )));
    }
    if update.kind != OperationType::Delete
        && node.is_some_and(|node| node.status.contains(UpdateStatus::DELETED))
    {
        return Err(Error::fault(format!(
            "Unable to consolidate {:?} operation, node Id={} is already deleted",
            update.kind, id
        )));
    }

    let current = node.map_or(UpdateStatus::UNCHANGED, |node| node.status);
    match (update.kind, synced_node) {
        (OperationType::Create, Some(synced_node)) => Err(Error::fault(format!(
            "Unable to consolidate Create operation, Synced Tree node Id={} already exists",
            synced_node.id()
        ))),
        (OperationType::Create, None)
        | (OperationType::Edit, None)
        | (OperationType::Move, None) => Ok(UpdateStatus::CREATED),
        (OperationType::Edit, Some(synced_node)) => {
            if update.model.attributes.same_content(synced_node.attributes()) {
                Ok(current.minus(UpdateStatus::EDITED))
            } else {
                current.union(UpdateStatus::EDITED)
            }
        }
        (OperationType::Move, Some(synced_node)) => {
            let status = if update.model.name == synced_node.name() {
                current.minus(UpdateStatus::RENAMED)
            } else {
                current.union(UpdateStatus::RENAMED)?
            };
            if update.model.parent_id == synced_parent_id(replica, synced, synced_node)? {
                Ok(status.minus(UpdateStatus::MOVED))
            } else {
                status.union(UpdateStatus::MOVED)
            }
        }
        (OperationType::Delete, _) => {
            if current.contains(UpdateStatus::RESTORE) {
                Ok(UpdateStatus::DELETED | UpdateStatus::RESTORE)
            } else {
                Ok(UpdateStatus::DELETED)
            }
        }
        (OperationType::Update, _) => Err(Error::fault(format!(
            "Unable to consolidate Update operation on node Id={}",
            id
        ))),
    }
}

/// Update Tree operation for `update`, or `None` when it leaves nothing to record
pub(super) fn consolidation_operation(
    replica: Replica,
    synced: &SyncedTree,
    update: &Operation<NodeModel>,
    node: Option<&UpdateNodeModel>,
    synced_node: Option<&SyncedNodeModel>,
) -> Result<Option<Operation<UpdateNodeModel>>> {
    let status = consolidated_status(replica, synced, update, node, synced_node)?;
    if status.contains(UpdateStatus::DELETED) && node.is_none() && synced_node.is_none() {
        return Ok(None);
    }
    if status.is_unchanged() && node.is_none() {
        return Ok(None);
    }

    let mut model = if update.kind == OperationType::Create {
        UpdateNodeModel::new(update.model.clone(), status)
    } else {
        let mut model = match (node, synced_node) {
            (Some(node), _) => node.clone(),
            (None, Some(synced_node)) => {
                UpdateNodeModel::new(synced_node.node.clone(), UpdateStatus::UNCHANGED)
                    .with_id(update.model.id)
                    .with_parent_id(synced_parent_id(replica, synced, synced_node)?)
            }
            (None, None) => return Err(Error::missing_node(synced.label(), update.model.id)),
        };
        match update.kind {
            OperationType::Edit => model.node.attributes.clone_from(&update.model.attributes),
            OperationType::Move => {
                model.node.parent_id = update.model.parent_id;
                model.node.name.clone_from(&update.model.name);
            }
            _ => {}
        }
        model
    };
    model.status = status;

    let kind = match node {
        None => OperationType::Create,
        Some(_)
            if status.contains(UpdateStatus::DELETED)
                || (status == UpdateStatus::CREATED && update.kind == OperationType::Create) =>
        {
            OperationType::Update
        }
        Some(_) => update.kind,
    };
    Ok(Some(Operation::new(kind, model)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_types::{NodeAttributes, NodeType};
    use rstest::rstest;

    fn id(value: u64) -> NodeId {
        NodeId::new(value)
    }

    fn synced() -> SyncedTree {
        let mut tree = SyncedTree::default();
        tree.execute_all([
            Operation::create(SyncedNodeModel::directory(id(1), id(0), "docs", id(101))),
            Operation::create(SyncedNodeModel::directory(id(2), id(0), "music", id(102))),
            Operation::create(SyncedNodeModel::new(
                NodeModel::new(id(3), id(1), "a.txt", NodeType::File)
                    .with_attributes(NodeAttributes::with_size(10).revision("r1")),
                id(103),
            )),
        ])
        .unwrap();
        tree
    }

    fn file(parent: u64, name: &str, size: u64, revision: &str) -> NodeModel {
        NodeModel::new(id(103), id(parent), name, NodeType::File)
            .with_attributes(NodeAttributes::with_size(size).revision(revision))
    }

    #[rstest]
    #[case(Operation::edit(file(101, "a.txt", 10, "r1")), UpdateStatus::UNCHANGED)]
    #[case(Operation::edit(file(101, "a.txt", 12, "r2")), UpdateStatus::EDITED)]
    #[case(Operation::moved(file(101, "b.txt", 10, "r1")), UpdateStatus::RENAMED)]
    #[case(Operation::moved(file(102, "a.txt", 10, "r1")), UpdateStatus::MOVED)]
    #[case(Operation::moved(file(102, "b.txt", 10, "r1")), UpdateStatus::RENAMED_AND_MOVED)]
    #[case(Operation::delete(file(101, "a.txt", 10, "r1")), UpdateStatus::DELETED)]
    fn test_status_against_baseline(
        #[case] update: Operation<NodeModel>,
        #[case] expected: UpdateStatus,
    ) {
        let synced = synced();
        let synced_node = synced.by_own_id(id(103), Replica::Remote);

        let status =
            consolidated_status(Replica::Remote, &synced, &update, None, synced_node).unwrap();
        assert_eq!(status, expected);
    }

    #[test]
    fn test_rename_back_clears_renamed() {
        let synced = synced();
        let node = UpdateNodeModel::file(id(103), id(101), "b.txt", UpdateStatus::RENAMED);
        let update = Operation::moved(file(101, "a.txt", 10, "r1"));

        let operation = consolidation_operation(
            Replica::Remote,
            &synced,
            &update,
            Some(&node),
            synced.by_own_id(id(103), Replica::Remote),
        )
        .unwrap()
        .unwrap();

        assert_eq!(operation.kind, OperationType::Move);
        assert!(operation.model.status.is_unchanged());
        assert_eq!(operation.model.name(), "a.txt");
    }

    #[test]
    fn test_unknown_node_without_change_is_dropped() {
        let synced = synced();
        let update = Operation::edit(file(101, "a.txt", 10, "r1"));
        let operation = consolidation_operation(
            Replica::Remote,
            &synced,
            &update,
            None,
            synced.by_own_id(id(103), Replica::Remote),
        )
        .unwrap();
        assert!(operation.is_none());
    }

    #[test]
    fn test_change_after_deletion_is_fault() {
        let synced = synced();
        let node = UpdateNodeModel::file(id(103), id(101), "a.txt", UpdateStatus::DELETED);
        let update = Operation::edit(file(101, "a.txt", 11, "r2"));

        let error = consolidated_status(
            Replica::Remote,
            &synced,
            &update,
            Some(&node),
            synced.by_own_id(id(103), Replica::Remote),
        )
        .unwrap_err();
        assert!(error.is_fault());
    }

    #[test]
    fn test_deletion_keeps_restore() {
        let synced = synced();
        let node = UpdateNodeModel::file(
            id(103),
            id(101),
            "a.txt",
            UpdateStatus::CREATED | UpdateStatus::RESTORE,
        );
        let update = Operation::delete(file(101, "a.txt", 10, "r1"));

        let status = consolidated_status(
            Replica::Remote,
            &synced,
            &update,
            Some(&node),
            synced.by_own_id(id(103), Replica::Remote),
        )
        .unwrap();
        assert_eq!(status, UpdateStatus::DELETED | UpdateStatus::RESTORE);
    }
}
