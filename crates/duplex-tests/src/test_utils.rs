use crate::memory_client::MemoryReplica;
use duplex_adapter::{AdapterState, ItemExclusionFilter, StateBasedUpdateDetection};
use duplex_config::Config;
use duplex_engine::SyncEngine;
use duplex_sync::{ConflictNaming, ReconciliationReport, SyncState};
use duplex_tree::{PropagationNodeModel, SerialScheduler, SyncedNodeModel, TreeNodeModel, UpdateNodeModel};
use duplex_types::{IdentitySource, NodeAttributes, NodeId, Replica, Result, UpdateStatus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shorthand for a node id
pub const fn id(value: u64) -> NodeId {
    NodeId::new(value)
}

/// Offset between a node's local id and its remote id in built states
pub const REMOTE_OFFSET: u64 = 1000;

/// Remote id of the node with local id `local`
pub const fn remote(local: u64) -> NodeId {
    NodeId::new(local + REMOTE_OFFSET)
}

/// Builds a [`SyncState`] from a synchronized baseline and the changes of both sides.
///
/// Baseline nodes get remote id `local + REMOTE_OFFSET`. Update Tree nodes are given in
/// their own replica's ids; missing ancestors must be added explicitly, parents first.
#[derive(Debug, Default)]
pub struct SyncStateBuilder {
    synced: Vec<SyncedNodeModel>,
    remote: Vec<UpdateNodeModel>,
    local: Vec<UpdateNodeModel>,
}

impl SyncStateBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a synchronized directory
    pub fn synced_directory(mut self, local: u64, parent: u64, name: &str) -> Self {
        self.synced
            .push(SyncedNodeModel::directory(id(local), id(parent), name, remote(local)));
        self
    }

    /// Add a synchronized file
    pub fn synced_file(mut self, local: u64, parent: u64, name: &str, size: u64) -> Self {
        let mut model = SyncedNodeModel::file(id(local), id(parent), name, remote(local));
        model.node.attributes = NodeAttributes::with_size(size);
        self.synced.push(model);
        self
    }

    /// Add a remote Update Tree node
    pub fn remote_update(mut self, model: UpdateNodeModel) -> Self {
        self.remote.push(model);
        self
    }

    /// Add a local Update Tree node
    pub fn local_update(mut self, model: UpdateNodeModel) -> Self {
        self.local.push(model);
        self
    }

    /// Build the trees
    pub fn build(self) -> Result<SyncState> {
        SyncState::from_snapshot(duplex_sync::SyncSnapshot {
            synced: self.synced,
            remote_updates: self.remote,
            local_updates: self.local,
            propagation: Vec::new(),
        })
    }
}

/// Update Tree file node with a size
pub fn file_update(node: u64, parent: u64, name: &str, size: u64, status: UpdateStatus) -> UpdateNodeModel {
    let mut model = UpdateNodeModel::file(id(node), id(parent), name, status);
    model.node.attributes = NodeAttributes::with_size(size);
    model
}

/// Update Tree directory node
pub fn directory_update(node: u64, parent: u64, name: &str, status: UpdateStatus) -> UpdateNodeModel {
    UpdateNodeModel::directory(id(node), id(parent), name, status)
}

/// Reconcile with the default conflict names
pub fn reconcile(state: &mut SyncState) -> Result<ReconciliationReport> {
    state.reconcile(&ConflictNaming::default(), &CancellationToken::new())
}

/// Propagation Tree node named `name`
pub fn propagation_node<'a>(state: &'a SyncState, name: &str) -> Option<&'a PropagationNodeModel> {
    state
        .propagation
        .pre_order(state.propagation.root_id())
        .into_iter()
        .filter_map(|node| state.propagation.get(node))
        .find(|model| model.name() == name)
}

/// State-based detection of one replica with the default filter.
///
/// Must be called within a Tokio runtime.
pub fn detection(replica: Replica, client: &MemoryReplica) -> StateBasedUpdateDetection {
    detection_with_filter(replica, client, ItemExclusionFilter::default())
}

/// State-based detection of one replica with a custom filter
pub fn detection_with_filter(
    replica: Replica,
    client: &MemoryReplica,
    filter: ItemExclusionFilter,
) -> StateBasedUpdateDetection {
    let state = AdapterState::new(replica, Arc::new(IdentitySource::default()), filter);
    StateBasedUpdateDetection::new(SerialScheduler::spawn("Test adapter", state, 16), Arc::new(client.clone()))
}

/// Engine over two in-memory replicas with the default configuration
pub fn engine(remote: &MemoryReplica, local: &MemoryReplica) -> Result<SyncEngine> {
    SyncEngine::new(
        &Config::default(),
        Arc::new(remote.clone()),
        Arc::new(local.clone()),
        SyncState::new(),
    )
}
