//! The trees reconciliation works on

use duplex_tree::{
    FileSystemTree, Operation, PropagationNodeModel, PropagationTree, SyncedNodeModel, SyncedTree, Transactional,
    TreeNodeModel, UpdateNodeModel, UpdateTree,
};
use duplex_types::{Replica, Result};
use serde::{Deserialize, Serialize};

/// Synced Tree, both Update Trees and the Propagation Tree.
///
/// The state lives on the reconciliation scheduler; consolidation and reconciliation
/// are methods on it so that every mutation happens on that single writer.
#[derive(Debug, Clone)]
pub struct SyncState {
    /// Baseline both replicas agreed on
    pub synced: SyncedTree,
    /// Pending remote changes, in remote ids
    pub remote_updates: UpdateTree,
    /// Pending local changes, in local ids
    pub local_updates: UpdateTree,
    /// Merged changes still to be propagated
    pub propagation: PropagationTree,
}

/// Reconciliation rebuilds the Propagation Tree and drains a whole Update Tree, so a
/// pass is rolled back from one copy of the state taken before it.
impl Transactional for SyncState {
    type Checkpoint = Box<Self>;

    fn begin(&mut self) -> Box<Self> {
        Box::new(self.clone())
    }

    fn commit(&mut self, _checkpoint: Box<Self>) {}

    fn rollback(&mut self, checkpoint: Box<Self>) {
        *self = *checkpoint;
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    /// Empty trees
    pub fn new() -> Self {
        Self {
            synced: SyncedTree::default(),
            remote_updates: UpdateTree::for_replica(Replica::Remote),
            local_updates: UpdateTree::for_replica(Replica::Local),
            propagation: PropagationTree::default(),
        }
    }

    /// Update Tree of `replica`
    pub fn update_tree(&self, replica: Replica) -> &UpdateTree {
        match replica {
            Replica::Remote => &self.remote_updates,
            Replica::Local => &self.local_updates,
        }
    }

    /// Update Tree of `replica`, mutably
    pub fn update_tree_mut(&mut self, replica: Replica) -> &mut UpdateTree {
        match replica {
            Replica::Remote => &mut self.remote_updates,
            Replica::Local => &mut self.local_updates,
        }
    }

    /// Build the trees from a snapshot; every node must follow its parent
    pub fn from_snapshot(snapshot: SyncSnapshot) -> Result<Self> {
        let mut state = Self::new();
        state
            .synced
            .execute_all(snapshot.synced.into_iter().map(Operation::create))?;
        state
            .remote_updates
            .execute_all(snapshot.remote_updates.into_iter().map(Operation::create))?;
        state
            .local_updates
            .execute_all(snapshot.local_updates.into_iter().map(Operation::create))?;
        state
            .propagation
            .execute_all(snapshot.propagation.into_iter().map(Operation::create))?;
        Ok(state)
    }

    /// Every non-root node of every tree, parents first
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            synced: nodes_of(&self.synced),
            remote_updates: nodes_of(&self.remote_updates),
            local_updates: nodes_of(&self.local_updates),
            propagation: nodes_of(&self.propagation),
        }
    }
}

fn nodes_of<M: TreeNodeModel>(tree: &FileSystemTree<M>) -> Vec<M> {
    tree.pre_order(tree.root_id())
        .into_iter()
        .skip(1)
        .filter_map(|id| tree.get(id).cloned())
        .collect()
}

/// Serializable form of [`SyncState`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// Synced Tree nodes
    #[serde(default)]
    pub synced: Vec<SyncedNodeModel>,
    /// Remote Update Tree nodes
    #[serde(default)]
    pub remote_updates: Vec<UpdateNodeModel>,
    /// Local Update Tree nodes
    #[serde(default)]
    pub local_updates: Vec<UpdateNodeModel>,
    /// Propagation Tree nodes
    #[serde(default)]
    pub propagation: Vec<PropagationNodeModel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_types::{NodeId, UpdateStatus};

    #[test]
    fn test_snapshot_round_trip_keeps_structure() {
        let snapshot = SyncSnapshot {
            synced: vec![
                SyncedNodeModel::directory(NodeId::new(1), NodeId::ROOT, "docs", NodeId::new(101)),
                SyncedNodeModel::file(NodeId::new(2), NodeId::new(1), "a.txt", NodeId::new(102)),
            ],
            local_updates: vec![
                UpdateNodeModel::directory(NodeId::new(1), NodeId::ROOT, "docs", UpdateStatus::UNCHANGED),
                UpdateNodeModel::file(NodeId::new(2), NodeId::new(1), "b.txt", UpdateStatus::RENAMED),
            ],
            ..SyncSnapshot::default()
        };

        let state = SyncState::from_snapshot(snapshot.clone()).unwrap();
        assert_eq!(state.synced.by_alt_id(&NodeId::new(102)).unwrap().name(), "a.txt");
        assert!(state.remote_updates.is_empty());
        assert_eq!(state.snapshot(), snapshot);
    }

    #[test]
    fn test_orphan_in_snapshot_is_rejected() {
        let snapshot = SyncSnapshot {
            synced: vec![SyncedNodeModel::file(NodeId::new(2), NodeId::new(1), "a.txt", NodeId::new(102))],
            ..SyncSnapshot::default()
        };
        assert!(SyncState::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn test_snapshot_json_defaults_missing_trees() {
        let json = r#"{"synced":[{"id":1,"parent_id":0,"name":"docs","type":"Directory","alt_id":101}]}"#;
        let snapshot: SyncSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.synced.len(), 1);
        assert!(snapshot.remote_updates.is_empty());
        assert!(snapshot.propagation.is_empty());
        let state = SyncState::from_snapshot(snapshot).unwrap();
        assert_eq!(state.synced.by_alt_id(&NodeId::new(101)).unwrap().name(), "docs");
    }

    #[test]
    fn test_rollback_restores_every_tree() {
        let mut state = SyncState::new();
        state
            .synced
            .execute(Operation::create(SyncedNodeModel::file(
                NodeId::new(2),
                NodeId::ROOT,
                "a.txt",
                NodeId::new(102),
            )))
            .unwrap();
        let before = state.snapshot();

        let checkpoint = state.begin();
        state
            .local_updates
            .execute(Operation::create(UpdateNodeModel::file(
                NodeId::new(2),
                NodeId::ROOT,
                "b.txt",
                UpdateStatus::RENAMED,
            )))
            .unwrap();
        let synced = state.synced.get(NodeId::new(2)).unwrap().clone();
        state.synced.execute(Operation::delete(synced)).unwrap();
        state.rollback(checkpoint);

        assert_eq!(state.snapshot(), before);
    }
}
