//! Applying observed replica state to the Adapter Tree
//!
//! Every change to the Adapter Tree made by update detection goes through
//! [`AdapterState::detect_node_update`], which equalizes the current and incoming
//! models and records the changes the sync engine must hear about.

use crate::model::{AdapterNodeModel, AdapterTreeExt};
use crate::state::AdapterState;
use crate::status::AdapterNodeStatus;
use duplex_tree::{equalize_operations, NodeModel, Operation, OperationType, TreeNodeModel};
use duplex_types::{Error, NodeId, Result};
use tracing::{debug, warn};

/// A change of the replica reported to the sync engine
pub type DetectedUpdate = Operation<NodeModel>;

impl AdapterState {
    /// Bring node `current` in line with `incoming`.
    ///
    /// `None` for `current` creates a node, `None` for `incoming` deletes one.
    /// Moving a sync root, or moving any node directly under the tree root, is a fault.
    pub fn detect_node_update(
        &mut self,
        current: Option<NodeId>,
        incoming: Option<AdapterNodeModel>,
    ) -> Result<()> {
        let current = current
            .map(|id| self.tree.require(id).cloned())
            .transpose()?;

        if let (Some(current), Some(incoming)) = (&current, &incoming) {
            if current.parent_id() != incoming.parent_id() {
                if self.tree.is_sync_root(current.id()) {
                    return Err(Error::fault(format!(
                        "{}: cannot move sync root Id={}",
                        self.tree.label(),
                        current.id()
                    )));
                }
                if self.tree.is_root(incoming.parent_id()) {
                    return Err(Error::fault(format!(
                        "{}: cannot move node Id={} to the tree root",
                        self.tree.label(),
                        current.id()
                    )));
                }
            }
        }

        let incoming = incoming.map(|model| {
            let model = self.with_id_and_content_version(current.as_ref(), model);
            self.without_sync_root_dirty_flags(model)
        });

        let operations = equalize_operations(current.as_ref(), incoming.as_ref())?;
        if operations.is_empty() {
            return Ok(());
        }
        for operation in &operations {
            self.tree.execute(operation.clone())?;
        }
        self.record_detected_updates(operations, current.as_ref(), incoming.as_ref());
        Ok(())
    }

    fn with_id_and_content_version(
        &mut self,
        current: Option<&AdapterNodeModel>,
        mut incoming: AdapterNodeModel,
    ) -> AdapterNodeModel {
        match current {
            Some(current) => {
                incoming.node.id = current.id();
                if incoming.content_version == 0 {
                    incoming.content_version = if !incoming.is_directory() && content_changed(current, &incoming) {
                        self.next_content_version()
                    } else {
                        current.content_version
                    };
                }
            }
            None => {
                if incoming.id().is_root() {
                    incoming.node.id = self.ids.next_id();
                }
                if incoming.is_directory() {
                    incoming.content_version = 0;
                } else if incoming.content_version == 0 {
                    incoming.content_version = self.next_content_version();
                }
            }
        }
        incoming
    }

    fn without_sync_root_dirty_flags(&self, mut incoming: AdapterNodeModel) -> AdapterNodeModel {
        if !self.tree.is_root(incoming.parent_id()) {
            return incoming;
        }
        if incoming.status.contains_any(AdapterNodeStatus::DIRTY_NODE_MASK) {
            warn!(
                "{}: sync root \"{}\" Id={} cannot be {}, ignoring",
                self.tree.label(),
                incoming.name(),
                incoming.id(),
                incoming.status.intersect(AdapterNodeStatus::DIRTY_NODE_MASK)
            );
            incoming.status = incoming.status.without(AdapterNodeStatus::DIRTY_NODE_MASK);
        }
        incoming
    }

    fn record_detected_updates(
        &mut self,
        operations: Vec<Operation<AdapterNodeModel>>,
        current: Option<&AdapterNodeModel>,
        incoming: Option<&AdapterNodeModel>,
    ) {
        if let (Some(current), Some(incoming)) = (current, incoming) {
            if current.is_dirty_placeholder() && !incoming.is_dirty_placeholder() {
                self.push_detected(Operation::create(incoming.node.clone()));
                return;
            }
        }
        for operation in operations {
            if is_reported(&operation, current) {
                self.push_detected(Operation::new(operation.kind, operation.model.node));
            }
        }
    }

    fn push_detected(&mut self, update: DetectedUpdate) {
        debug!(
            "{}: detected {:?} of \"{}\" Id={} under Id={}",
            self.tree.label(),
            update.kind,
            update.model.name,
            update.model.id,
            update.model.parent_id
        );
        self.detected.push(update);
    }
}

fn is_reported(operation: &Operation<AdapterNodeModel>, current: Option<&AdapterNodeModel>) -> bool {
    match operation.kind {
        OperationType::Update => false,
        OperationType::Edit if operation.model.is_directory() => false,
        OperationType::Delete => !current.is_some_and(AdapterNodeModel::is_dirty_placeholder),
        _ => !operation.model.is_dirty_placeholder(),
    }
}

/// File content differs: revisions decide when both sides have one, otherwise a
/// changed last write time or a size change not explained by on-demand storage
fn content_changed(current: &AdapterNodeModel, incoming: &AdapterNodeModel) -> bool {
    let (current, incoming) = (current.attributes(), incoming.attributes());
    if let (Some(a), Some(b)) = (&current.revision_id, &incoming.revision_id) {
        return a != b;
    }
    (current.last_write_time.is_some() && current.last_write_time != incoming.last_write_time)
        || (current.size != incoming.size && incoming.size_on_storage != current.size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ItemExclusionFilter;
    use duplex_types::{ExternalId, IdentitySource, NodeAttributes, Replica};
    use std::sync::Arc;

    fn id(value: u64) -> NodeId {
        NodeId::new(value)
    }

    fn state() -> AdapterState {
        let mut state = AdapterState::new(
            Replica::Local,
            Arc::new(IdentitySource::starting_at(100)),
            ItemExclusionFilter::default(),
        );
        state
            .tree
            .execute(Operation::create(
                AdapterNodeModel::directory(id(1), id(0), "1").with_alt_id(Some(ExternalId::new(1, "r"))),
            ))
            .unwrap();
        state
    }

    fn file(name: &str, size: u64) -> AdapterNodeModel {
        AdapterNodeModel::file(NodeId::ROOT, id(1), name, NodeAttributes::with_size(size))
            .with_alt_id(Some(ExternalId::new(1, name)))
    }

    #[test]
    fn test_new_file_gets_id_and_content_version() {
        let mut state = state();
        state.detect_node_update(None, Some(file("a", 1))).unwrap();
        let created = state.tree.by_alt_id(&ExternalId::new(1, "a")).unwrap();
        assert_eq!(created.id(), id(100));
        assert_eq!(created.content_version, 1);

        let updates = state.take_detected_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, OperationType::Create);
        assert!(state.detected_updates().is_empty());
    }

    #[test]
    fn test_content_change_bumps_version() {
        let mut state = state();
        state.detect_node_update(None, Some(file("a", 1))).unwrap();
        let node = state.tree.by_alt_id(&ExternalId::new(1, "a")).unwrap().id();
        state.take_detected_updates();

        state.detect_node_update(Some(node), Some(file("a", 2))).unwrap();
        assert_eq!(state.tree.get(node).unwrap().content_version, 2);
        let updates = state.take_detected_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, OperationType::Edit);
    }

    #[test]
    fn test_status_only_change_is_not_reported() {
        let mut state = state();
        state.detect_node_update(None, Some(file("a", 1))).unwrap();
        let node = state.tree.by_alt_id(&ExternalId::new(1, "a")).unwrap().clone();
        state.take_detected_updates();

        let flagged = node.clone().with_flags(AdapterNodeStatus::DIRTY_ATTRIBUTES);
        state.detect_node_update(Some(node.id()), Some(flagged)).unwrap();
        assert!(state.tree.get(node.id()).unwrap().has_dirty_attributes());
        assert!(state.take_detected_updates().is_empty());
    }

    #[test]
    fn test_moving_sync_root_is_fault() {
        let mut state = state();
        state
            .tree
            .execute(Operation::create(AdapterNodeModel::directory(id(2), id(0), "2")))
            .unwrap();
        let moved = state.tree.get(id(1)).unwrap().clone().with_parent_id(id(2));
        assert!(state.detect_node_update(Some(id(1)), Some(moved)).unwrap_err().is_fault());
    }

    #[test]
    fn test_sync_root_keeps_no_node_flags() {
        let mut state = state();
        let flagged = state
            .tree
            .get(id(1))
            .unwrap()
            .clone()
            .with_flags(AdapterNodeStatus::DIRTY_PARENT | AdapterNodeStatus::DIRTY_CHILDREN);
        state.detect_node_update(Some(id(1)), Some(flagged)).unwrap();
        assert_eq!(state.tree.get(id(1)).unwrap().status, AdapterNodeStatus::DIRTY_CHILDREN);
    }

    #[test]
    fn test_placeholder_confirmed_is_reported_as_create() {
        let mut state = state();
        let placeholder = AdapterNodeModel::directory(id(5), id(1), "p")
            .with_status(AdapterNodeStatus::DIRTY_PLACEHOLDER);
        state.detect_node_update(None, Some(placeholder.clone())).unwrap();
        assert!(state.take_detected_updates().is_empty());

        let confirmed = placeholder
            .with_status(AdapterNodeStatus::NONE)
            .with_alt_id(Some(ExternalId::new(1, "p")));
        state.detect_node_update(Some(id(5)), Some(confirmed)).unwrap();
        let updates = state.take_detected_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, OperationType::Create);
        assert_eq!(updates[0].model.id, id(5));
    }

    #[test]
    fn test_revision_decides_content_change() {
        let mut current = file("a", 1);
        current.node.attributes.revision_id = Some("r1".into());
        let mut incoming = file("a", 2);
        incoming.node.attributes.revision_id = Some("r1".into());
        assert!(!content_changed(&current, &incoming));
        incoming.node.attributes.revision_id = Some("r2".into());
        assert!(content_changed(&current, &incoming));
    }
}
