//! Sync engine implementation

use crate::report::CycleReport;
use duplex_adapter::{AdapterState, AdapterTree, ItemExclusionFilter, StateBasedUpdateDetection};
use duplex_config::{Config, ConfigLoader};
use duplex_sync::{ConflictNaming, ReconciliationPipeline, SyncSnapshot, SyncState};
use duplex_tree::{FileSystemTree, SerialScheduler, TreeNodeModel};
use duplex_types::{Error, FileSystemClient, IdentitySource, Replica, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs synchronization cycles between a remote and a local replica
#[derive(Debug)]
pub struct SyncEngine {
    config: Arc<Config>,
    remote: StateBasedUpdateDetection,
    local: StateBasedUpdateDetection,
    reconciliation: ReconciliationPipeline,
    started: AtomicBool,
}

impl SyncEngine {
    /// Create an engine over two replicas, resuming from `state`.
    ///
    /// Spawns the serial schedulers, so it must be called within a Tokio runtime.
    pub fn new(
        config: &Config,
        remote_client: Arc<dyn FileSystemClient>,
        local_client: Arc<dyn FileSystemClient>,
        state: SyncState,
    ) -> Result<Self> {
        EngineBuilder::new()
            .with_config(config.clone())
            .with_state(state)
            .build(remote_client, local_client)
    }

    fn assemble(
        config: Config,
        clients: [Arc<dyn FileSystemClient>; 2],
        state: SyncState,
        trees: [Option<(AdapterTree, u32)>; 2],
    ) -> Result<Self> {
        let naming = &config.naming;
        let naming = ConflictNaming::from_templates(
            &naming.name_clash_template,
            &naming.delete_conflict_template,
            &naming.edit_conflict_template,
            naming.max_name_length,
            naming.suffix_length,
        )?;
        let detection = &config.detection;
        let filter = ItemExclusionFilter::new(&detection.ignored_extensions, &detection.special_folder_names)
            .with_office_temp_files_ignored(detection.ignore_office_temp_files);
        let capacity = config.scheduler.queue_capacity;

        let ids = Arc::new(IdentitySource::default());
        observe_ids(&ids, &state);

        let [remote_client, local_client] = clients;
        let [remote_tree, local_tree] = trees;
        let adapter = |replica: Replica, tree: Option<(AdapterTree, u32)>| {
            let state = AdapterState::new(replica, Arc::clone(&ids), filter.clone());
            match tree {
                Some((tree, format_version)) => state.with_tree(tree, format_version),
                None => state,
            }
        };
        let remote = StateBasedUpdateDetection::new(
            SerialScheduler::spawn("Remote adapter", adapter(Replica::Remote, remote_tree), capacity),
            remote_client,
        );
        let local = StateBasedUpdateDetection::new(
            SerialScheduler::spawn("Local adapter", adapter(Replica::Local, local_tree), capacity),
            local_client,
        );
        let reconciliation = ReconciliationPipeline::spawn(state, naming, capacity);

        info!("Sync engine initialized");
        Ok(Self {
            config: Arc::new(config),
            remote,
            local,
            reconciliation,
            started: AtomicBool::new(false),
        })
    }

    /// Run one cycle: detect both replicas, consolidate, reconcile.
    ///
    /// The first cycle enumerates the sync roots and rescans them entirely. A cancelled
    /// cycle fails with [`Error::Cancelled`] and leaves the dirty flags for the next one.
    pub async fn run_cycle(&self, cancellation_token: &CancellationToken) -> Result<CycleReport> {
        info!("Sync cycle started");
        let result = self.try_run_cycle(cancellation_token).await;
        match &result {
            Ok(report) => info!("Sync cycle finished: {}", report),
            Err(Error::Cancelled) => info!("Sync cycle cancelled"),
            Err(fault) if fault.is_fault() => error!("Sync cycle stopped by a fault: {}", fault),
            Err(other) => warn!("Sync cycle failed: {}", other),
        }
        result
    }

    async fn try_run_cycle(&self, cancellation_token: &CancellationToken) -> Result<CycleReport> {
        if !self.started.load(Ordering::Acquire) {
            let (remote, local) = futures::try_join!(
                self.remote.start(cancellation_token),
                self.local.start(cancellation_token)
            )?;
            if remote.is_success() && local.is_success() {
                self.started.store(true, Ordering::Release);
            } else {
                warn!("Sync root enumeration failed: remote {:?}, local {:?}", remote, local);
            }
        }

        let (remote, local) = futures::try_join!(
            self.remote.execute(cancellation_token),
            self.local.execute(cancellation_token)
        )?;
        let (remote_updates, local_updates) = futures::try_join!(
            self.remote.take_detected_updates(),
            self.local.take_detected_updates()
        )?;

        // Taken updates are gone from the adapters, so consolidation ignores cancellation
        let (remote_updates, local_updates) = self
            .reconciliation
            .scheduler()
            .schedule_and_commit(move |state| -> Result<(usize, usize)> {
                let uncancelled = CancellationToken::new();
                let remote = state.consolidate_all(Replica::Remote, &remote_updates, &uncancelled)?;
                let local = state.consolidate_all(Replica::Local, &local_updates, &uncancelled)?;
                Ok((remote, local))
            })
            .await??;

        let reconciliation = self.reconciliation.execute(cancellation_token).await?;
        Ok(CycleReport {
            remote,
            local,
            remote_updates,
            local_updates,
            reconciliation,
        })
    }

    /// Make the next cycle enumerate the sync roots again and rescan them entirely
    pub fn request_rescan(&self) {
        self.started.store(false, Ordering::Release);
    }

    /// Copy of the Synced, Update and Propagation Trees
    pub async fn snapshot(&self) -> Result<SyncSnapshot> {
        self.reconciliation.snapshot().await
    }

    /// Copy of a replica's Adapter Tree
    pub async fn adapter_tree(&self, replica: Replica) -> Result<AdapterTree> {
        self.detection(replica)
            .scheduler()
            .schedule(|state| state.tree.clone())
            .await
    }

    /// Update detection of a replica
    pub const fn detection(&self, replica: Replica) -> &StateBasedUpdateDetection {
        match replica {
            Replica::Remote => &self.remote,
            Replica::Local => &self.local,
        }
    }

    /// Reconciliation pipeline
    pub const fn reconciliation(&self) -> &ReconciliationPipeline {
        &self.reconciliation
    }

    /// Engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Keep newly allocated ids clear of every id the trees already use
fn observe_ids(ids: &IdentitySource, state: &SyncState) {
    fn observe_tree<M: TreeNodeModel>(ids: &IdentitySource, tree: &FileSystemTree<M>) {
        for id in tree.pre_order(tree.root_id()) {
            ids.observe(id);
        }
    }
    observe_tree(ids, &state.synced);
    observe_tree(ids, &state.remote_updates);
    observe_tree(ids, &state.local_updates);
    observe_tree(ids, &state.propagation);
    for model in state.synced.pre_order(state.synced.root_id()).into_iter().filter_map(|id| state.synced.get(id)) {
        ids.observe(model.alt_id);
    }
    for model in state
        .propagation
        .pre_order(state.propagation.root_id())
        .into_iter()
        .filter_map(|id| state.propagation.get(id))
    {
        ids.observe(model.alt_id);
    }
}

/// Builder for creating a sync engine with custom configuration
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: Option<Config>,
    state: Option<SyncState>,
    remote_tree: Option<(AdapterTree, u32)>,
    local_tree: Option<(AdapterTree, u32)>,
}

impl EngineBuilder {
    /// Create a new engine builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Resume from previously saved Synced, Update and Propagation Trees
    #[must_use]
    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = Some(state);
        self
    }

    /// Resume a replica from a previously saved Adapter Tree
    #[must_use]
    pub fn with_adapter_tree(mut self, replica: Replica, tree: AdapterTree, format_version: u32) -> Self {
        match replica {
            Replica::Remote => self.remote_tree = Some((tree, format_version)),
            Replica::Local => self.local_tree = Some((tree, format_version)),
        }
        self
    }

    /// Build the sync engine. Must be called within a Tokio runtime.
    pub fn build(
        self,
        remote_client: Arc<dyn FileSystemClient>,
        local_client: Arc<dyn FileSystemClient>,
    ) -> Result<SyncEngine> {
        let config = match self.config {
            Some(config) => config,
            None => ConfigLoader::load_default()?,
        };

        SyncEngine::assemble(
            config,
            [remote_client, local_client],
            self.state.unwrap_or_default(),
            [self.remote_tree, self.local_tree],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use duplex_adapter::{AdapterTreeExt, ADAPTER_TREE_FORMAT_VERSION};
    use duplex_types::{
        FileSystemError, FileSystemErrorCode, FsResult, NodeInfo, RevisionCreationProcess, RootInfo, UpdateStatus,
    };
    use futures::stream::{self, BoxStream, StreamExt};
    use std::collections::HashMap;

    /// Replica with a fixed content
    #[derive(Default)]
    struct StaticClient {
        roots: Vec<RootInfo>,
        items: HashMap<String, NodeInfo>,
    }

    impl StaticClient {
        fn with_root(root: &str) -> Self {
            Self {
                roots: vec![RootInfo::new(1, 1, root)],
                items: HashMap::new(),
            }
        }

        fn with_item(mut self, info: NodeInfo) -> Self {
            self.items.insert(info.id.clone().unwrap_or_default(), info);
            self
        }
    }

    fn unsupported(info: &NodeInfo) -> FileSystemError {
        FileSystemError::new(FileSystemErrorCode::UnauthorizedAccess, info.id.clone(), "read-only replica")
    }

    #[async_trait]
    impl FileSystemClient for StaticClient {
        async fn enumerate_roots(&self, _cancel: &CancellationToken) -> FsResult<Vec<RootInfo>> {
            Ok(self.roots.clone())
        }

        async fn get_info(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<NodeInfo> {
            info.id
                .as_ref()
                .and_then(|id| self.items.get(id))
                .cloned()
                .ok_or_else(|| FileSystemError::new(FileSystemErrorCode::ObjectNotFound, info.id.clone(), "not found"))
        }

        fn enumerate<'a>(
            &'a self,
            info: &'a NodeInfo,
            _cancel: &'a CancellationToken,
        ) -> BoxStream<'a, FsResult<NodeInfo>> {
            let children: Vec<_> = self
                .items
                .values()
                .filter(|item| item.parent_id == info.id)
                .cloned()
                .map(Ok)
                .collect();
            stream::iter(children).boxed()
        }

        async fn create_directory(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<NodeInfo> {
            Err(unsupported(info))
        }

        async fn create_file(
            &self,
            info: &NodeInfo,
            _cancel: &CancellationToken,
        ) -> FsResult<Box<dyn RevisionCreationProcess>> {
            Err(unsupported(info))
        }

        async fn create_revision(
            &self,
            info: &NodeInfo,
            _cancel: &CancellationToken,
        ) -> FsResult<Box<dyn RevisionCreationProcess>> {
            Err(unsupported(info))
        }

        async fn move_node(
            &self,
            info: &NodeInfo,
            _destination: &NodeInfo,
            _cancel: &CancellationToken,
        ) -> FsResult<()> {
            Err(unsupported(info))
        }

        async fn delete(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<()> {
            Err(unsupported(info))
        }

        async fn delete_permanently(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<()> {
            Err(unsupported(info))
        }

        async fn delete_revision(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<()> {
            Err(unsupported(info))
        }

        async fn set_in_sync_state(&self, info: &NodeInfo) -> FsResult<()> {
            Err(unsupported(info))
        }

        async fn hydrate_file(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<()> {
            Err(unsupported(info))
        }
    }

    fn engine(remote: StaticClient, local: StaticClient) -> SyncEngine {
        SyncEngine::new(&Config::default(), Arc::new(remote), Arc::new(local), SyncState::new()).unwrap()
    }

    #[tokio::test]
    async fn test_engine_without_roots() {
        let engine = engine(StaticClient::default(), StaticClient::default());

        let report = engine.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.remote_updates, 0);
        assert_eq!(report.local_updates, 0);
        assert!(!report.has_pending_changes());
    }

    #[tokio::test]
    async fn test_engine_builder() {
        let mut config = Config::default();
        config.scheduler.queue_capacity = 4;

        let engine = EngineBuilder::new()
            .with_config(config)
            .build(Arc::new(StaticClient::default()), Arc::new(StaticClient::default()))
            .unwrap();

        assert_eq!(engine.config().scheduler.queue_capacity, 4);
        assert_eq!(engine.detection(Replica::Remote).scheduler().name(), "Remote adapter");
    }

    #[tokio::test]
    async fn test_invalid_naming_template_is_rejected() {
        let mut config = Config::default();
        config.naming.name_clash_template = "{Unknown}".to_string();

        let result = EngineBuilder::new()
            .with_config(config)
            .build(Arc::new(StaticClient::default()), Arc::new(StaticClient::default()));

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_remote_file_is_to_be_created_locally() {
        let remote = StaticClient::with_root("r0").with_item(NodeInfo::file("r1", "r0", "a.txt", 3).with_revision("1"));
        let engine = engine(remote, StaticClient::with_root("l0"));

        let report = engine.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.remote_updates, 2);
        assert_eq!(report.local_updates, 1);
        assert_eq!(report.reconciliation.real_conflicts().count(), 0);
        assert!(report.has_pending_changes());
        let snapshot = engine.snapshot().await.unwrap();
        let file = snapshot
            .propagation
            .iter()
            .find(|node| node.name() == "a.txt")
            .unwrap();
        assert_eq!(file.remote_status, UpdateStatus::CREATED);
        assert_eq!(file.local_status, UpdateStatus::UNCHANGED);
    }

    #[tokio::test]
    async fn test_equal_replicas_become_synced() {
        let remote = StaticClient::with_root("r0").with_item(NodeInfo::file("r1", "r0", "a.txt", 3).with_revision("1"));
        let local = StaticClient::with_root("l0").with_item(NodeInfo::file("l1", "l0", "a.txt", 3).with_revision("1"));
        let engine = engine(remote, local);

        let report = engine.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.reconciliation.real_conflicts().count(), 0);
        assert!(!report.has_pending_changes());
        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.synced.len(), 2);
        assert!(snapshot.local_updates.is_empty());
    }

    #[tokio::test]
    async fn test_second_cycle_detects_nothing_new() {
        let remote = StaticClient::with_root("r0").with_item(NodeInfo::directory("r1", "r0", "docs"));
        let engine = engine(remote, StaticClient::with_root("l0"));
        let token = CancellationToken::new();

        engine.run_cycle(&token).await.unwrap();
        let second = engine.run_cycle(&token).await.unwrap();

        assert_eq!(second.remote_updates, 0);
        assert_eq!(second.local_updates, 0);
        let tree = engine.adapter_tree(Replica::Remote).await.unwrap();
        assert_eq!(tree.len(), 3);
        assert!(tree.child_ids(tree.root_id()).iter().all(|id| tree.is_sync_root(*id)));
    }

    #[tokio::test]
    async fn test_cancelled_cycle_fails() {
        let engine = engine(StaticClient::with_root("r0"), StaticClient::with_root("l0"));
        let token = CancellationToken::new();
        token.cancel();

        let result = engine.run_cycle(&token).await;

        assert_eq!(result.unwrap_err(), Error::Cancelled);
        assert!(engine.snapshot().await.unwrap().synced.is_empty());
    }

    #[tokio::test]
    async fn test_resumed_adapter_tree_keeps_ids_unique() {
        let remote = StaticClient::with_root("r0");
        let seeded = SyncEngine::new(
            &Config::default(),
            Arc::new(remote),
            Arc::new(StaticClient::default()),
            SyncState::new(),
        )
        .unwrap();
        seeded.run_cycle(&CancellationToken::new()).await.unwrap();
        let tree = seeded.adapter_tree(Replica::Remote).await.unwrap();
        let used = tree.child_ids(tree.root_id());

        let remote = StaticClient::with_root("r0").with_item(NodeInfo::file("r1", "r0", "b.txt", 1));
        let engine = EngineBuilder::new()
            .with_config(Config::default())
            .with_adapter_tree(Replica::Remote, tree, ADAPTER_TREE_FORMAT_VERSION)
            .build(Arc::new(remote), Arc::new(StaticClient::default()))
            .unwrap();
        engine.run_cycle(&CancellationToken::new()).await.unwrap();

        let tree = engine.adapter_tree(Replica::Remote).await.unwrap();
        let file = tree
            .pre_order(tree.root_id())
            .into_iter()
            .find(|id| tree.get(*id).is_some_and(|model| model.name() == "b.txt"))
            .unwrap();
        assert!(!used.contains(&file));
    }
}
