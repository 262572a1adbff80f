//! Folding detected replica changes into an Update Tree
//!
//! Each detected update is checked against the Synced Tree and the Update Tree,
//! turned into a status relative to the baseline and applied to the Update Tree.
//! Nodes whose status falls back to Unchanged are pruned along with their
//! Unchanged ancestors, so the Update Tree only holds what still differs.

mod ancestors;
mod deletion;
mod status;

pub(crate) use ancestors::with_missing_ancestors;

use crate::state::SyncState;
use duplex_tree::{
    NodeModel, Operation, OperationType, SyncedNodeModel, SyncedTree, TreeNodeModel,
    UpdateNodeModel, UpdateTree,
};
use duplex_types::{Error, Replica, Result, UpdateStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consolidation of one replica's detected updates
#[derive(Debug)]
pub struct UpdateConsolidation<'a> {
    replica: Replica,
    synced: &'a SyncedTree,
    updates: &'a mut UpdateTree,
}

impl<'a> UpdateConsolidation<'a> {
    /// Consolidate into `updates`, the Update Tree of `replica`
    pub fn new(replica: Replica, synced: &'a SyncedTree, updates: &'a mut UpdateTree) -> Self {
        Self {
            replica,
            synced,
            updates,
        }
    }

    /// Fold one detected update, in `replica` ids, into the Update Tree.
    ///
    /// Updates inconsistent with the current state are logged and ignored. Updates that
    /// contradict it (a Create of a known node, any change of a deleted node) are faults.
    pub fn execute(&mut self, update: &Operation<NodeModel>) -> Result<()> {
        debug!(
            "Started consolidating {} {:?} {}/{} \"{}\"",
            self.replica, update.kind, update.model.parent_id, update.model.id, update.model.name
        );

        let synced_node = self.synced.by_own_id(update.model.id, self.replica);
        let node = self.updates.get(update.model.id).cloned();
        if !self.is_consistent(update, node.as_ref(), synced_node) {
            return Ok(());
        }
        let Some(operation) = status::consolidation_operation(
            self.replica,
            self.synced,
            update,
            node.as_ref(),
            synced_node,
        )?
        else {
            return Ok(());
        };
        if !has_effect(&operation, node.as_ref()) {
            return Ok(());
        }

        let previous_parent = node.as_ref().map(TreeNodeModel::parent_id);
        match &node {
            Some(node)
                if operation.model.status.contains(UpdateStatus::DELETED)
                    && !node.status.contains(UpdateStatus::DELETED) =>
            {
                self.execute_deletion(node.id())?;
            }
            _ => {
                self.execute_with_missing_ancestors(operation)?;
                if let Some(node) = &node {
                    self.updates.remove_unchanged_leaves(node.id())?;
                }
            }
        }
        if let Some(parent_id) = previous_parent {
            self.updates.remove_unchanged_leaves(parent_id)?;
        }

        debug!(
            "Finished consolidating {} {:?} {}/{}",
            self.replica, update.kind, update.model.parent_id, update.model.id
        );
        Ok(())
    }

    fn is_consistent(
        &self,
        update: &Operation<NodeModel>,
        node: Option<&UpdateNodeModel>,
        synced_node: Option<&SyncedNodeModel>,
    ) -> bool {
        let node_exists = node.is_some() || synced_node.is_some();
        let parent_id = update.model.parent_id;
        let parent_exists = !matches!(update.kind, OperationType::Create | OperationType::Move)
            || self.updates.contains(parent_id)
            || self.synced.by_own_id(parent_id, self.replica).is_some();

        let consistent = match update.kind {
            OperationType::Create => parent_exists,
            OperationType::Edit | OperationType::Delete => node_exists,
            OperationType::Move => node_exists && parent_exists,
            OperationType::Update => true,
        };
        if !consistent {
            warn!(
                "Inconsistent detected update: {} {:?} {} at parent {}",
                self.replica, update.kind, update.model.id, parent_id
            );
        }
        consistent
    }

    fn execute_with_missing_ancestors(&mut self, operation: Operation<UpdateNodeModel>) -> Result<()> {
        let operations = with_missing_ancestors(self.replica, self.synced, self.updates, operation)?;
        self.updates.execute_all(operations)
    }
}

fn has_effect(operation: &Operation<UpdateNodeModel>, node: Option<&UpdateNodeModel>) -> bool {
    !node.is_some_and(|node| operation.kind != OperationType::Delete && *node == operation.model)
}

impl SyncState {
    /// Fold one detected update of `replica` into its Update Tree
    pub fn consolidate(&mut self, replica: Replica, update: &Operation<NodeModel>) -> Result<()> {
        let updates = match replica {
            Replica::Remote => &mut self.remote_updates,
            Replica::Local => &mut self.local_updates,
        };
        UpdateConsolidation::new(replica, &self.synced, updates).execute(update)
    }

    /// Fold a batch of detected updates of `replica`, in detection order.
    ///
    /// Cancellation is checked between updates; the ones already folded stay folded.
    pub fn consolidate_all<'u, I>(
        &mut self,
        replica: Replica,
        updates: I,
        cancellation_token: &CancellationToken,
    ) -> Result<usize>
    where
        I: IntoIterator<Item = &'u Operation<NodeModel>>,
    {
        info!("Started {} consolidation", replica);
        let tree = match replica {
            Replica::Remote => &mut self.remote_updates,
            Replica::Local => &mut self.local_updates,
        };
        let mut consolidation = UpdateConsolidation::new(replica, &self.synced, tree);
        let mut count = 0;
        for update in updates {
            if cancellation_token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            consolidation.execute(update)?;
            count += 1;
        }
        info!("Finished {} consolidation of {} updates", replica, count);
        Ok(count)
    }
}
