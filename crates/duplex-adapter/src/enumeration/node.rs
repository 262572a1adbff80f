//! Single node refresh

use super::{settle, Escape, Interrupt, Outcome};
use crate::model::{AdapterNodeModel, AdapterTreeExt};
use crate::state::AdapterState;
use crate::status::AdapterNodeStatus;
use duplex_tree::{SerialScheduler, TreeNodeModel};
use duplex_types::{Error, ExternalId, FileSystemClient, NodeId, NodeInfo, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Refresh the metadata and location of a node marked `DirtyPlaceholder`,
/// `DirtyAttributes` or `DirtyParent`
pub async fn enumerate_node(
    scheduler: &SerialScheduler<AdapterState>,
    client: &dyn FileSystemClient,
    node: NodeId,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    let prepared = scheduler
        .schedule(move |state| state.prepare_node_enumeration(node))
        .await?;
    let info = match prepared {
        Ok(Some(info)) => info,
        Ok(None) => return Ok(Outcome::Unchanged),
        Err(interrupt) => return settle(Err(interrupt)),
    };
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    debug!("{}: enumerating Id={}", scheduler.name(), node);

    match client.get_info(&info, cancel).await {
        Ok(current) => settle(
            scheduler
                .schedule_and_commit(move |state| state.apply_node_info(node, &current).map(|()| Outcome::Succeeded))
                .await?,
        ),
        Err(error) => {
            warn!("{}: enumerating Id={} failed: {}", scheduler.name(), node, error);
            let code = error.code;
            let handled = scheduler
                .schedule(move |state| state.handle_enumeration_failure(&error, node))
                .await?;
            if let Err(Interrupt::Fault(fault)) = handled {
                return Err(fault);
            }
            Ok(Outcome::Failed(code))
        }
    }
}

impl AdapterState {
    fn prepare_node_enumeration(&self, id: NodeId) -> Escape<Option<NodeInfo>> {
        let model = self.ensure_node_enumerable(id)?;
        let pending = AdapterNodeStatus::DIRTY_PLACEHOLDER
            | AdapterNodeStatus::DIRTY_ATTRIBUTES
            | AdapterNodeStatus::DIRTY_PARENT;
        if self.tree.is_root(id) || !model.status.contains_any(pending) {
            return Ok(None);
        }
        Ok(self.tree.node_info(id))
    }

    /// Apply the refreshed metadata of a node
    fn apply_node_info(&mut self, id: NodeId, info: &NodeInfo) -> Escape<()> {
        if self.tree.is_root(id) {
            return Err(Error::fault(format!("{}: the tree root cannot be enumerated", self.tree.label())).into());
        }
        let current = self.existing(id)?.clone();
        let parent = current.parent_id();

        if self.tree.is_sync_root(id) {
            self.validate_and_update(Some(id), current, parent)?;
            return Ok(());
        }

        let volume_id = self.volume_of(id);
        let incoming = AdapterNodeModel::from_info(info, parent, volume_id)
            .with_id(id)
            .with_status(current.status);

        if current.is_dirty_placeholder() {
            return self.apply_placeholder_info(&current, incoming, info);
        }

        let parent = match info.parent_id.as_ref().filter(|parent_id| !parent_id.is_empty()) {
            Some(parent_id) => self.parent_node(&ExternalId::new(volume_id, parent_id.clone()))?,
            None => Some(parent),
        };
        if self.should_be_ignored(Some(id), info, parent) {
            self.mark_as_deleted(Some(id))?;
            return Ok(());
        }
        let Some(parent) = parent else {
            return Ok(());
        };
        self.validate_and_update(Some(id), incoming.with_parent_id(parent), parent)?;
        Ok(())
    }

    /// A placeholder turned out to exist: adopt the known node it stands for, confirm
    /// it in place, or replace it when the item type differs
    fn apply_placeholder_info(
        &mut self,
        placeholder: &AdapterNodeModel,
        incoming: AdapterNodeModel,
        info: &NodeInfo,
    ) -> Escape<()> {
        let parent = placeholder.parent_id();
        let existing = self
            .existing_node(incoming.alt_id.as_ref(), incoming.node_type())?
            .filter(|existing| *existing != placeholder.id());

        if let Some(existing) = existing {
            self.remove_node(placeholder.id())?;
            if self.should_be_ignored(Some(existing), info, Some(parent)) {
                self.mark_as_deleted(Some(existing))?;
                return Ok(());
            }
            let status = self.tree.require(existing)?.status;
            self.validate_and_update(Some(existing), incoming.with_id(existing).with_status(status), parent)?;
            return Ok(());
        }

        if self.should_be_ignored(None, info, Some(parent)) {
            self.remove_node(placeholder.id())?;
            return Ok(());
        }

        if incoming.node_type() == placeholder.node_type() {
            let status = incoming.status.with_dirty_flags(AdapterNodeStatus::DIRTY_DESCENDANTS);
            self.validate_and_update(Some(placeholder.id()), incoming.with_status(status), parent)?;
        } else {
            self.remove_node(placeholder.id())?;
            self.validate_and_update(None, incoming, parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ItemExclusionFilter;
    use duplex_tree::{Operation, OperationType};
    use duplex_types::{IdentitySource, NodeAttributes, NodeType, Replica};
    use std::sync::Arc;

    fn id(value: u64) -> NodeId {
        NodeId::new(value)
    }

    fn alt(item: &str) -> Option<ExternalId> {
        Some(ExternalId::new(1, item))
    }

    /// "1"(1) -> a(2) -> {f.txt(3), placeholders p.txt(4) and d(5)}
    fn state() -> AdapterState {
        let mut state = AdapterState::new(
            Replica::Local,
            Arc::new(IdentitySource::starting_at(100)),
            ItemExclusionFilter::default(),
        );
        state
            .tree
            .execute_all([
                Operation::create(AdapterNodeModel::directory(id(1), id(0), "1").with_alt_id(alt("r"))),
                Operation::create(AdapterNodeModel::directory(id(2), id(1), "a").with_alt_id(alt("a"))),
                Operation::create(
                    AdapterNodeModel::file(id(3), id(2), "f.txt", NodeAttributes::with_size(1)).with_alt_id(alt("f")),
                ),
                Operation::create(
                    AdapterNodeModel::file(id(4), id(2), "p.txt", NodeAttributes::default())
                        .with_status(AdapterNodeStatus::DIRTY_PLACEHOLDER),
                ),
                Operation::create(
                    AdapterNodeModel::directory(id(5), id(2), "d").with_status(AdapterNodeStatus::DIRTY_PLACEHOLDER),
                ),
            ])
            .unwrap();
        state
    }

    #[test]
    fn test_placeholder_of_known_item_is_merged_into_it() {
        let mut state = state();

        state
            .apply_node_info(id(4), &NodeInfo::file("f", "a", "renamed.txt", 2))
            .unwrap();

        assert!(!state.tree.contains(id(4)));
        let node = state.tree.get(id(3)).unwrap();
        assert_eq!(node.name(), "renamed.txt");
        assert_eq!(node.parent_id(), id(2));
        assert_eq!(node.attributes().size, Some(2));
        assert!(!node.is_dirty_placeholder());
    }

    #[test]
    fn test_placeholder_is_confirmed_in_place() {
        let mut state = state();

        state.apply_node_info(id(5), &NodeInfo::directory("d", "a", "d")).unwrap();

        let node = state.tree.get(id(5)).unwrap();
        assert_eq!(node.alt_id, alt("d"));
        assert!(!node.is_dirty_placeholder());
        assert!(node.has_dirty_descendants());
        let updates = state.take_detected_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, OperationType::Create);
        assert_eq!(updates[0].model.id, id(5));
    }

    #[test]
    fn test_placeholder_of_another_type_is_replaced() {
        let mut state = state();

        state.apply_node_info(id(4), &NodeInfo::directory("p", "a", "p.txt")).unwrap();

        let node = state.tree.by_alt_id(&ExternalId::new(1, "p")).unwrap();
        assert_eq!(node.node_type(), NodeType::Directory);
        assert_eq!(node.parent_id(), id(2));
        assert!(!node.is_dirty_placeholder());
        assert_eq!(
            state.tree.children_named(id(2), "p.txt").count(),
            1,
            "the file placeholder is gone"
        );
    }

    #[test]
    fn test_ignored_item_removes_placeholder() {
        let mut state = state();

        state.apply_node_info(id(4), &NodeInfo::file("p", "a", "p.tmp", 1)).unwrap();

        assert!(!state.tree.contains(id(4)));
        assert!(state.tree.by_alt_id(&ExternalId::new(1, "p")).is_none());
        assert!(state.take_detected_updates().is_empty());
    }

    #[test]
    fn test_ignored_known_item_is_marked_deleted() {
        let mut state = state();

        state.apply_node_info(id(4), &NodeInfo::file("f", "a", "~$f.txt", 1)).unwrap();

        assert!(!state.tree.contains(id(4)));
        assert!(state.tree.get(id(3)).unwrap().is_dirty_deleted());
    }
}
