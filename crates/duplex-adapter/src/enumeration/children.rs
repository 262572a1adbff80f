//! Directory listing refresh

use super::{settle, Escape, Interrupt, Outcome};
use crate::model::{AdapterNodeModel, AdapterTreeExt};
use crate::state::AdapterState;
use crate::status::AdapterNodeStatus;
use duplex_tree::{SerialScheduler, TreeNodeModel};
use duplex_types::{Error, FileSystemClient, NodeId, NodeInfo, Result};
use futures::StreamExt;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Refresh the children of a directory marked `DirtyChildren`.
///
/// Before listing, every child is marked `DirtyAttributes`; children the listing does
/// not report are marked `DirtyParent` once the listing completes, and are removed by
/// deletion detection unless they are found elsewhere first.
pub async fn enumerate_children(
    scheduler: &SerialScheduler<AdapterState>,
    client: &dyn FileSystemClient,
    node: NodeId,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    let prepared = scheduler
        .schedule(move |state| state.prepare_children_enumeration(node))
        .await?;
    let (info, mut unprocessed) = match prepared {
        Ok(Some(prepared)) => prepared,
        Ok(None) => return Ok(Outcome::Unchanged),
        Err(interrupt) => return settle(Err(interrupt)),
    };
    debug!("{}: enumerating children of Id={}", scheduler.name(), node);

    let mut entries = client.enumerate(&info, cancel);
    while let Some(entry) = entries.next().await {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match entry {
            Ok(child) => {
                let (remaining, result) = scheduler
                    .schedule(move |state| {
                        let result = state.add_enumerated_child(node, &child, &mut unprocessed);
                        (unprocessed, result)
                    })
                    .await?;
                unprocessed = remaining;
                if let Err(interrupt) = result {
                    return settle(Err(interrupt));
                }
            }
            Err(error) => {
                warn!(
                    "{}: enumerating children of Id={} failed: {}",
                    scheduler.name(),
                    node,
                    error
                );
                let code = error.code;
                let handled = scheduler
                    .schedule(move |state| state.handle_enumeration_failure(&error, node))
                    .await?;
                if let Err(Interrupt::Fault(fault)) = handled {
                    return Err(fault);
                }
                return Ok(Outcome::Failed(code));
            }
        }
    }
    drop(entries);

    settle(
        scheduler
            .schedule_and_commit(move |state| {
                state
                    .complete_children_enumeration(node, &unprocessed)
                    .map(|()| Outcome::Succeeded)
            })
            .await?,
    )
}

impl AdapterState {
    /// Mark the current children as unconfirmed and return what to list
    fn prepare_children_enumeration(&mut self, id: NodeId) -> Escape<Option<(NodeInfo, BTreeSet<NodeId>)>> {
        let model = self.ensure_children_enumerable(id)?;
        if !model.has_dirty_children() {
            return Ok(None);
        }
        let deep = model.has_dirty_descendants();
        let info = self
            .tree
            .node_info(id)
            .ok_or_else(|| Error::missing_node(self.tree.label(), id))?;

        let children: BTreeSet<NodeId> = self
            .tree
            .children(id)
            .filter(|child| !child.is_dirty_deleted())
            .map(TreeNodeModel::id)
            .collect();
        for child in &children {
            let mut flags = AdapterNodeStatus::DIRTY_ATTRIBUTES;
            if deep && self.tree.get(*child).is_some_and(TreeNodeModel::is_directory) {
                flags = flags.with(AdapterNodeStatus::DIRTY_DESCENDANTS);
            }
            self.append_dirty_flags(*child, flags)?;
        }
        Ok(Some((info, children)))
    }

    /// Apply one listed child
    fn add_enumerated_child(&mut self, parent: NodeId, info: &NodeInfo, unprocessed: &mut BTreeSet<NodeId>) -> Escape<()> {
        if info.name.is_empty() {
            return Err(Error::fault(format!("{}: listed item under Id={parent} has no name", self.tree.label())).into());
        }
        if self.tree.is_root(parent) && !info.is_directory() {
            return Err(Error::fault(format!(
                "{}: file \"{}\" listed under the tree root",
                self.tree.label(),
                info.name
            ))
            .into());
        }
        self.existing(parent)?;
        if self.tree.is_node_or_branch_deleted(parent) {
            return Err(Interrupt::Aborted);
        }

        let incoming = AdapterNodeModel::from_info(info, parent, self.volume_of(parent));
        let existing = self.existing_node(incoming.alt_id.as_ref(), incoming.node_type())?;
        if let Some(existing) = existing {
            unprocessed.remove(&existing);
            if self.tree.is_sync_root(existing) {
                return Ok(());
            }
        }
        if self.should_be_ignored(existing, info, Some(parent)) {
            self.mark_as_deleted(existing)?;
            return Ok(());
        }

        let incoming = match existing.and_then(|id| self.tree.get(id)) {
            Some(current) => incoming.with_id(current.id()).with_status(current.status),
            None => incoming,
        };
        self.validate_and_update(existing, incoming, parent)?;
        Ok(())
    }

    /// Mark unlisted children as lost and clear the listing flags
    fn complete_children_enumeration(&mut self, id: NodeId, unprocessed: &BTreeSet<NodeId>) -> Escape<()> {
        let model = self.existing(id)?;
        if model.is_dirty_deleted() {
            return Err(Interrupt::Aborted);
        }
        let deep = model.has_dirty_descendants();

        for child in unprocessed {
            let Some(current) = self.tree.get(*child).filter(|current| current.parent_id() == id) else {
                continue;
            };
            if current.is_dirty_placeholder() {
                self.remove_node(*child)?;
                continue;
            }
            if !current.has_dirty_attributes() {
                continue;
            }
            let mut flags = AdapterNodeStatus::DIRTY_PARENT;
            if deep && current.is_directory() {
                flags = flags.with(AdapterNodeStatus::DIRTY_DESCENDANTS);
            }
            debug!("{}: {} was not listed", self.tree.label(), self.display_name(*child));
            self.append_dirty_flags(*child, flags)?;
        }

        let model = self.tree.require(id)?.clone();
        self.detect_node_update(Some(id), Some(model.without_flags(AdapterNodeStatus::DIRTY_DESCENDANTS)))?;
        Ok(())
    }
}
