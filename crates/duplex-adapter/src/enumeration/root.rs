//! Sync root enumeration

use super::Outcome;
use crate::model::{AdapterNodeModel, AdapterTreeExt};
use crate::state::{AdapterState, ADAPTER_TREE_FORMAT_VERSION};
use crate::status::AdapterNodeStatus;
use duplex_tree::{Operation, SerialScheduler, TreeNodeModel};
use duplex_types::{Error, ExternalId, FileSystemClient, NodeId, NodeType, Result, RootInfo};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Match the replica's sync roots with the first-level nodes of the Adapter Tree.
///
/// New roots are created, roots that moved to another volume are migrated when the
/// tree predates volume-aware matching, and first-level nodes without a matching root
/// are deleted.
pub async fn enumerate_roots(
    scheduler: &SerialScheduler<AdapterState>,
    client: &dyn FileSystemClient,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let mut unprocessed: BTreeSet<NodeId> = scheduler
        .schedule(|state| state.tree.child_ids(state.tree.root_id()).into_iter().collect())
        .await?;

    let roots = match client.enumerate_roots(cancel).await {
        Ok(roots) => roots,
        Err(error) => {
            warn!("{}: enumerating sync roots failed: {}", scheduler.name(), error);
            return Ok(Outcome::Failed(error.code));
        }
    };
    info!("{}: replica reports {} sync root(s)", scheduler.name(), roots.len());

    for root in roots {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let (remaining, result) = scheduler
            .schedule(move |state| {
                let result = state.add_sync_root(root, &mut unprocessed);
                (unprocessed, result)
            })
            .await?;
        unprocessed = remaining;
        result?;
    }

    scheduler
        .schedule_and_commit(move |state| state.remove_sync_roots(&unprocessed))
        .await??;
    Ok(Outcome::Succeeded)
}

impl AdapterState {
    fn add_sync_root(&mut self, root: RootInfo, unprocessed: &mut BTreeSet<NodeId>) -> Result<()> {
        let tree_root = self.tree.root_id();
        let alt_id = ExternalId::new(root.volume_id, root.node_id.clone());
        let incoming = AdapterNodeModel::directory(NodeId::ROOT, tree_root, root.id.to_string())
            .with_alt_id(Some(alt_id.clone()))
            .with_status(AdapterNodeStatus::DIRTY_DESCENDANTS);

        let node = match self.matching_sync_root(&incoming, &root)? {
            Some(existing) => {
                unprocessed.remove(&existing);
                let volume_id = self
                    .tree
                    .get(existing)
                    .and_then(|model| model.alt_id.as_ref())
                    .map(|alt| alt.volume_id);
                if volume_id != Some(root.volume_id) {
                    if self.format_version >= ADAPTER_TREE_FORMAT_VERSION {
                        return Err(Error::fault(format!(
                            "{}: sync root Id={existing} changed volume from {volume_id:?} to {}",
                            self.tree.label(),
                            root.volume_id
                        )));
                    }
                    self.migrate_sync_root(existing, root.volume_id)?;
                }
                existing
            }
            None => {
                debug!("{}: adding sync root {}", self.tree.label(), root.id);
                self.validate_and_update(None, incoming, tree_root)?;
                self.tree
                    .by_alt_id(&alt_id)
                    .map(TreeNodeModel::id)
                    .ok_or_else(|| Error::fault(format!("{}: sync root {} was not added", self.tree.label(), root.id)))?
            }
        };
        self.sync_roots.insert(node, root);
        Ok(())
    }

    /// Existing first-level node for a sync root. A match that is not first-level is
    /// marked deleted, a match under another name loses its alt id.
    ///
    /// The same root recorded on another volume is matched by name and item id; the
    /// caller decides whether it is migrated.
    fn matching_sync_root(&mut self, incoming: &AdapterNodeModel, root: &RootInfo) -> Result<Option<NodeId>> {
        let mut found = self.existing_node(incoming.alt_id.as_ref(), NodeType::Directory)?;
        if found.is_none() {
            found = self
                .tree
                .children(self.tree.root_id())
                .find(|model| {
                    model.is_directory()
                        && model.name() == incoming.name()
                        && model.alt_id.as_ref().is_some_and(|alt| alt.item_id == root.node_id)
                })
                .map(TreeNodeModel::id);
        }
        let Some(found) = found else {
            return Ok(None);
        };

        if !self.tree.is_sync_root(found) {
            warn!(
                "{}: sync root {} matches nested node Id={found}",
                self.tree.label(),
                root.id
            );
            let model = self.tree.require(found)?.clone();
            self.detect_node_update(
                Some(found),
                Some(model.with_alt_id(None).with_flags(AdapterNodeStatus::DIRTY_DELETED)),
            )?;
            return Ok(None);
        }
        if self.tree.get(found).is_some_and(|model| model.name() != incoming.name()) {
            warn!(
                "{}: sync root {} matches node Id={found} of another root",
                self.tree.label(),
                root.id
            );
            self.release_alt_id(found)?;
            return Ok(None);
        }
        Ok(Some(found))
    }

    /// Rewrite the volume of every alt id in the branch
    fn migrate_sync_root(&mut self, id: NodeId, volume_id: u64) -> Result<()> {
        info!(
            "{}: migrating sync root Id={id} to volume {volume_id}",
            self.tree.label()
        );
        for node in self.tree.pre_order(id) {
            let mut model = self.tree.require(node)?.clone();
            if let Some(alt) = &mut model.alt_id {
                alt.volume_id = volume_id;
                self.tree.execute(Operation::update(model))?;
            }
        }
        Ok(())
    }

    fn remove_sync_roots(&mut self, unprocessed: &BTreeSet<NodeId>) -> Result<()> {
        for id in unprocessed {
            if self.tree.contains(*id) {
                info!("{}: sync root {} is gone", self.tree.label(), self.display_name(*id));
                self.sync_roots.remove(id);
                self.remove_node(*id)?;
            }
        }
        if self.format_version < ADAPTER_TREE_FORMAT_VERSION {
            info!(
                "{}: format upgraded from version {} to {}",
                self.tree.label(),
                self.format_version,
                ADAPTER_TREE_FORMAT_VERSION
            );
            self.format_version = ADAPTER_TREE_FORMAT_VERSION;
        }
        Ok(())
    }
}
