//! Reconciliation of both Update Trees into the Propagation Tree
//!
//! A reconciliation pass rebuilds the Propagation Tree from scratch:
//!
//! 1. the Propagation Tree is cleared
//! 2. every remote Update Tree node is copied into it, in local ids where the Synced
//!    Tree knows the node
//! 3. the local Update Tree is drained node by node, each node merged with its remote
//!    counterpart, conflicts detected and resolved on the way
//!
//! Local directory deletions are drained last, so that nodes moved out of a deleted
//! directory are reconciled before the deletion cascades to the rest of its branch.

mod adjustment;
mod apply;
mod detection;
mod merge;
mod preparation;
mod pseudo;
mod resolution;

use crate::conflict::Conflict;
use crate::consolidation::with_missing_ancestors;
use crate::naming::ConflictNaming;
use crate::state::{SyncSnapshot, SyncState};
use duplex_tree::{
    equalize_operations, Operation, PropagationNodeModel, SerialScheduler, TreeNodeModel,
    UpdateNodeModel,
};
use duplex_types::{Error, Replica, Result, UpdateStatus};
use merge::UpdateMerge;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Conflicts detected, pseudo conflicts included, in detection order
    pub conflicts: Vec<Conflict>,
    /// Nodes in the Propagation Tree, root excluded
    pub propagation_nodes: usize,
}

impl ReconciliationReport {
    /// Conflicts that needed a resolution, pseudo conflicts excluded
    pub fn real_conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts
            .iter()
            .filter(|conflict| !conflict.conflict_type.is_pseudo())
    }
}

impl SyncState {
    /// Rebuild the Propagation Tree from both Update Trees.
    ///
    /// Cancellation is checked between local nodes. A cancelled or failed pass leaves the
    /// trees half-reconciled; run it through [`ReconciliationPipeline`] to have them
    /// rolled back.
    pub fn reconcile(
        &mut self,
        naming: &ConflictNaming,
        cancellation_token: &CancellationToken,
    ) -> Result<ReconciliationReport> {
        info!("Started reconciliation");
        self.propagation.clear();
        self.copy_remote_updates()?;
        let conflicts = self.merge_local_updates(naming, cancellation_token)?;

        let report = ReconciliationReport {
            conflicts,
            propagation_nodes: self.propagation.len() - 1,
        };
        info!(
            "Finished reconciliation: {} propagation nodes, {} conflicts",
            report.propagation_nodes,
            report.conflicts.len()
        );
        Ok(report)
    }

    fn copy_remote_updates(&mut self) -> Result<()> {
        let root_id = self.remote_updates.root_id();
        for id in self.remote_updates.pre_order(root_id).into_iter().skip(1) {
            let node = self.remote_updates.require(id)?;
            let mapped = self.mapped_from_remote(node);
            let model = PropagationNodeModel::new(mapped.node, node.id())
                .with_statuses(node.status, UpdateStatus::UNCHANGED);
            self.propagation.execute(Operation::create(model))?;
        }
        debug!("Copied {} remote updates", self.propagation.len() - 1);
        Ok(())
    }

    fn merge_local_updates(
        &mut self,
        naming: &ConflictNaming,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<Conflict>> {
        let pending = self.drain_local_updates();

        let mut merge = UpdateMerge::new(self, naming);
        for node in pending {
            if cancellation_token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            debug!("Merging local update {} \"{}\" {}", node.id(), node.name(), node.status);
            merge.execute_local(node)?;
        }
        Ok(merge.into_conflicts())
    }

    /// Changed local Update Tree nodes, directory deletions last, leaving the tree empty
    fn drain_local_updates(&mut self) -> Vec<UpdateNodeModel> {
        let root_id = self.local_updates.root_id();
        let (deletions, others): (Vec<_>, Vec<_>) = self
            .local_updates
            .pre_order(root_id)
            .into_iter()
            .skip(1)
            .filter_map(|id| self.local_updates.get(id))
            .filter(|node| !node.status.is_unchanged())
            .cloned()
            .partition(|node| node.is_directory() && node.status.contains(UpdateStatus::DELETED));
        self.local_updates.clear();
        others.into_iter().chain(deletions).collect()
    }

    /// Put a drained local update back, with the ancestors it needs
    pub(crate) fn restore_local_update(&mut self, node: UpdateNodeModel) -> Result<()> {
        let current = self.local_updates.get(node.id()).cloned();
        for operation in equalize_operations(current.as_ref(), Some(&node))? {
            let operations =
                with_missing_ancestors(Replica::Local, &self.synced, &self.local_updates, operation)?;
            self.local_updates.execute_all(operations)?;
        }
        Ok(())
    }
}

/// Reconciliation running on the serial scheduler that owns the [`SyncState`].
///
/// Consolidation and reconciliation both mutate the state through this scheduler, so
/// a pass never interleaves with a batch of detected updates. A failed or cancelled
/// pass is rolled back.
#[derive(Debug, Clone)]
pub struct ReconciliationPipeline {
    scheduler: SerialScheduler<SyncState>,
    naming: Arc<ConflictNaming>,
}

impl ReconciliationPipeline {
    /// Spawn the scheduler owning `state`. Must be called within a Tokio runtime.
    pub fn spawn(state: SyncState, naming: ConflictNaming, queue_capacity: usize) -> Self {
        Self {
            scheduler: SerialScheduler::spawn("Reconciliation", state, queue_capacity),
            naming: Arc::new(naming),
        }
    }

    /// Scheduler owning the state
    pub fn scheduler(&self) -> &SerialScheduler<SyncState> {
        &self.scheduler
    }

    /// Run one reconciliation pass
    pub async fn execute(&self, cancellation_token: &CancellationToken) -> Result<ReconciliationReport> {
        if cancellation_token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let naming = Arc::clone(&self.naming);
        let token = cancellation_token.clone();
        self.scheduler
            .schedule_and_commit(move |state| state.reconcile(&naming, &token))
            .await?
    }

    /// Copy of all trees
    pub async fn snapshot(&self) -> Result<SyncSnapshot> {
        self.scheduler.schedule(|state| state.snapshot()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictType;
    use duplex_tree::SyncedNodeModel;
    use duplex_types::{NodeAttributes, NodeId};

    fn id(value: u64) -> NodeId {
        NodeId::new(value)
    }

    fn sized(model: UpdateNodeModel, size: u64) -> UpdateNodeModel {
        let mut model = model;
        model.node.attributes = NodeAttributes::with_size(size);
        model
    }

    fn state(synced: Vec<SyncedNodeModel>, remote: Vec<UpdateNodeModel>, local: Vec<UpdateNodeModel>) -> SyncState {
        SyncState::from_snapshot(SyncSnapshot {
            synced,
            remote_updates: remote,
            local_updates: local,
            ..SyncSnapshot::default()
        })
        .unwrap()
    }

    fn run(state: &mut SyncState) -> ReconciliationReport {
        state
            .reconcile(&ConflictNaming::default(), &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn test_local_rename() {
        let mut state = state(
            vec![
                SyncedNodeModel::directory(id(1), NodeId::ROOT, "a", id(101)),
                SyncedNodeModel::file(id(5), id(1), "old.txt", id(105)),
            ],
            vec![],
            vec![
                UpdateNodeModel::directory(id(1), NodeId::ROOT, "a", UpdateStatus::UNCHANGED),
                UpdateNodeModel::file(id(5), id(1), "a.txt", UpdateStatus::RENAMED),
            ],
        );

        let report = run(&mut state);

        assert!(report.conflicts.is_empty());
        let node = state.propagation.get(id(5)).unwrap();
        assert_eq!(node.name(), "a.txt");
        assert_eq!(node.alt_id, id(105));
        assert_eq!(node.local_status, UpdateStatus::RENAMED);
        assert_eq!(node.remote_status, UpdateStatus::UNCHANGED);
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let mut state = state(
            vec![
                SyncedNodeModel::directory(id(1), NodeId::ROOT, "a", id(101)),
                SyncedNodeModel::directory(id(2), NodeId::ROOT, "b", id(102)),
                SyncedNodeModel::file(id(3), id(1), "f", id(103)),
            ],
            vec![
                UpdateNodeModel::directory(id(101), NodeId::ROOT, "a", UpdateStatus::UNCHANGED),
                UpdateNodeModel::file(id(103), id(101), "g", UpdateStatus::RENAMED),
            ],
            vec![UpdateNodeModel::file(id(9), id(2), "new", UpdateStatus::CREATED)],
        );

        let first = run(&mut state);
        let snapshot = state.snapshot();
        let second = run(&mut state);

        assert_eq!(first, second);
        assert_eq!(state.snapshot(), snapshot);
    }

    #[test]
    fn test_equal_edits_are_pseudo_conflict() {
        let mut state = state(
            vec![SyncedNodeModel::file(id(3), NodeId::ROOT, "f", id(103))],
            vec![sized(UpdateNodeModel::file(id(103), NodeId::ROOT, "f", UpdateStatus::EDITED), 20)],
            vec![sized(UpdateNodeModel::file(id(3), NodeId::ROOT, "f", UpdateStatus::EDITED), 20)],
        );

        let report = run(&mut state);

        assert_eq!(report.conflicts, vec![Conflict::new(id(3), ConflictType::EditEditPseudo)]);
        assert!(state.propagation.is_empty());
        assert!(state.remote_updates.is_empty());
        assert!(state.local_updates.is_empty());
        assert_eq!(state.synced.get(id(3)).unwrap().attributes().size, Some(20));
    }

    #[test]
    fn test_different_edits_keep_remote_content_and_back_up_local() {
        let mut state = state(
            vec![SyncedNodeModel::file(id(3), NodeId::ROOT, "f.txt", id(103))],
            vec![sized(UpdateNodeModel::file(id(103), NodeId::ROOT, "f.txt", UpdateStatus::EDITED), 20)],
            vec![sized(UpdateNodeModel::file(id(3), NodeId::ROOT, "f.txt", UpdateStatus::EDITED), 30)],
        );

        let report = run(&mut state);

        assert_eq!(report.conflicts, vec![Conflict::new(id(3), ConflictType::EditEdit)]);
        let node = state.propagation.get(id(3)).unwrap();
        assert_eq!(node.name(), "f.txt");
        assert_eq!(node.attributes().size, Some(20));
        assert_eq!(node.remote_status, UpdateStatus::EDITED);
        assert_eq!(node.local_status, UpdateStatus::UNCHANGED);
        let backup = node.backup_name.as_deref().unwrap();
        assert!(backup.starts_with("f (# Edit conflict"), "{backup}");
        assert!(backup.ends_with(".txt"), "{backup}");
    }

    #[test]
    fn test_name_clash_renames_one_node_once() {
        let mut state = state(
            vec![],
            vec![sized(UpdateNodeModel::file(id(150), NodeId::ROOT, "x", UpdateStatus::CREATED), 10)],
            vec![sized(UpdateNodeModel::file(id(50), NodeId::ROOT, "x", UpdateStatus::CREATED), 20)],
        );

        let report = run(&mut state);
        let snapshot = state.snapshot();

        assert_eq!(report.real_conflicts().count(), 1);
        assert_eq!(report.conflicts[0].conflict_type, ConflictType::CreateCreate);
        let names: Vec<_> = state.propagation.children(NodeId::ROOT).map(|node| node.name().to_string()).collect();
        assert_eq!(names.len(), 2);
        assert_eq!(names.iter().filter(|name| *name == "x").count(), 1);
        assert!(names.iter().any(|name| name.starts_with("x (# Name clash")));

        run(&mut state);
        assert_eq!(state.snapshot(), snapshot);
    }

    #[test]
    fn test_equal_creations_are_pseudo_conflict() {
        let mut state = state(
            vec![],
            vec![sized(UpdateNodeModel::file(id(150), NodeId::ROOT, "x", UpdateStatus::CREATED), 10)],
            vec![sized(UpdateNodeModel::file(id(50), NodeId::ROOT, "x", UpdateStatus::CREATED), 10)],
        );

        let report = run(&mut state);

        assert_eq!(report.real_conflicts().count(), 0);
        assert!(report
            .conflicts
            .iter()
            .any(|conflict| conflict.conflict_type == ConflictType::CreateCreatePseudo));
        assert!(state.propagation.is_empty());
        assert_eq!(state.synced.get(id(50)).unwrap().alt_id, id(150));
    }

    /// d(1) { c(2) }, e(3)
    fn deletion_baseline() -> Vec<SyncedNodeModel> {
        vec![
            SyncedNodeModel::directory(id(1), NodeId::ROOT, "d", id(101)),
            SyncedNodeModel::file(id(2), id(1), "c", id(102)),
            SyncedNodeModel::directory(id(3), NodeId::ROOT, "e", id(103)),
        ]
    }

    #[test]
    fn test_node_moved_out_of_locally_deleted_directory_survives() {
        let mut state = state(
            deletion_baseline(),
            vec![
                UpdateNodeModel::directory(id(103), NodeId::ROOT, "e", UpdateStatus::UNCHANGED),
                UpdateNodeModel::file(id(102), id(103), "c", UpdateStatus::MOVED),
            ],
            vec![
                UpdateNodeModel::directory(id(1), NodeId::ROOT, "d", UpdateStatus::DELETED),
                UpdateNodeModel::file(id(2), id(1), "c", UpdateStatus::DELETED),
            ],
        );

        let report = run(&mut state);

        assert!(report
            .conflicts
            .iter()
            .all(|conflict| conflict.conflict_type == ConflictType::MoveDelete));
        let c = state.propagation.get(id(2)).unwrap();
        assert_eq!(c.parent_id(), id(3));
        assert!(!c.is_deleted());
        let d = state.propagation.get(id(1)).unwrap();
        assert!(d.local_status.contains(UpdateStatus::DELETED));
        assert!(state.propagation.is_leaf(id(1)));
    }

    #[test]
    fn test_node_moved_out_of_remotely_deleted_directory_survives() {
        let mut state = state(
            deletion_baseline(),
            vec![
                UpdateNodeModel::directory(id(101), NodeId::ROOT, "d", UpdateStatus::DELETED),
                UpdateNodeModel::file(id(102), id(101), "c", UpdateStatus::DELETED),
            ],
            vec![
                UpdateNodeModel::directory(id(3), NodeId::ROOT, "e", UpdateStatus::UNCHANGED),
                UpdateNodeModel::file(id(2), id(3), "c", UpdateStatus::MOVED),
            ],
        );

        run(&mut state);

        let c = state.propagation.get(id(2)).unwrap();
        assert_eq!(c.parent_id(), id(3));
        assert!(!c.is_deleted());
        assert!(state.propagation.get(id(1)).unwrap().remote_status.contains(UpdateStatus::DELETED));
        assert!(state.propagation.is_leaf(id(1)));
    }

    #[test]
    fn test_cyclic_move_is_undone() {
        // Remote moves a into b while local moves b into a
        let mut state = state(
            vec![
                SyncedNodeModel::directory(id(1), NodeId::ROOT, "a", id(101)),
                SyncedNodeModel::directory(id(2), NodeId::ROOT, "b", id(102)),
            ],
            vec![
                UpdateNodeModel::directory(id(102), NodeId::ROOT, "b", UpdateStatus::UNCHANGED),
                UpdateNodeModel::directory(id(101), id(102), "a", UpdateStatus::MOVED),
            ],
            vec![
                UpdateNodeModel::directory(id(1), NodeId::ROOT, "a", UpdateStatus::UNCHANGED),
                UpdateNodeModel::directory(id(2), id(1), "b", UpdateStatus::MOVED),
            ],
        );

        let report = run(&mut state);

        assert_eq!(report.conflicts, vec![Conflict::new(id(2), ConflictType::MoveMoveCycle)]);
        assert_eq!(state.propagation.get(id(2)).unwrap().parent_id(), NodeId::ROOT);
        assert_eq!(state.propagation.get(id(1)).unwrap().parent_id(), id(2));
    }

    #[test]
    fn test_cancelled_pass_fails() {
        let mut state = state(
            vec![],
            vec![],
            vec![UpdateNodeModel::file(id(9), NodeId::ROOT, "new", UpdateStatus::CREATED)],
        );
        let token = CancellationToken::new();
        token.cancel();

        let result = state.reconcile(&ConflictNaming::default(), &token);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_pipeline_refuses_cancelled_pass() {
        let state = state(
            vec![],
            vec![UpdateNodeModel::file(id(150), NodeId::ROOT, "r", UpdateStatus::CREATED)],
            vec![UpdateNodeModel::file(id(9), NodeId::ROOT, "new", UpdateStatus::CREATED)],
        );
        let before = state.snapshot();
        let pipeline = ReconciliationPipeline::spawn(state, ConflictNaming::default(), 4);

        let token = CancellationToken::new();
        let report = pipeline.execute(&token).await.unwrap();
        assert_eq!(report.propagation_nodes, 2);

        token.cancel();
        assert!(matches!(pipeline.execute(&token).await, Err(Error::Cancelled)));
        let after = pipeline.snapshot().await.unwrap();
        assert_eq!(after.local_updates, before.local_updates);
        assert_eq!(after.propagation.len(), 2);
    }
}
