//! State owned by an adapter's serial scheduler

use crate::detection::DetectedUpdate;
use crate::filter::ItemExclusionFilter;
use crate::model::{adapter_tree, AdapterTree};
use duplex_tree::{Transactional, TreeNodeModel};
use duplex_types::{IdentitySource, NodeId, Replica, RootInfo};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Adapter Tree format written by this version. Older trees match sync roots by item
/// id alone and are migrated on the next root enumeration.
pub const ADAPTER_TREE_FORMAT_VERSION: u32 = 2;

/// Adapter Tree plus the bookkeeping of one replica's update detection
#[derive(Debug, Clone)]
pub struct AdapterState {
    /// Replica the tree mirrors
    pub replica: Replica,
    /// Last known state of the replica
    pub tree: AdapterTree,
    /// Format version of `tree`
    pub format_version: u32,
    /// Sync roots found by the last root enumeration, keyed by node id
    pub sync_roots: BTreeMap<NodeId, RootInfo>,
    /// Items excluded from synchronization
    pub filter: ItemExclusionFilter,
    pub(crate) ids: Arc<IdentitySource>,
    pub(crate) last_content_version: u64,
    pub(crate) detected: Vec<DetectedUpdate>,
}

/// Bookkeeping of an [`AdapterState`] before a scheduled job; the tree journals itself
#[derive(Debug)]
pub struct AdapterCheckpoint {
    format_version: u32,
    sync_roots: BTreeMap<NodeId, RootInfo>,
    last_content_version: u64,
    detected: usize,
}

impl Transactional for AdapterState {
    type Checkpoint = AdapterCheckpoint;

    fn begin(&mut self) -> AdapterCheckpoint {
        self.tree.begin_transaction();
        AdapterCheckpoint {
            format_version: self.format_version,
            sync_roots: self.sync_roots.clone(),
            last_content_version: self.last_content_version,
            detected: self.detected.len(),
        }
    }

    fn commit(&mut self, _checkpoint: AdapterCheckpoint) {
        self.tree.commit_transaction();
    }

    fn rollback(&mut self, checkpoint: AdapterCheckpoint) {
        self.tree.rollback_transaction();
        self.format_version = checkpoint.format_version;
        self.sync_roots = checkpoint.sync_roots;
        self.last_content_version = checkpoint.last_content_version;
        self.detected.truncate(checkpoint.detected);
    }
}

impl AdapterState {
    /// Empty state in the current format
    pub fn new(replica: Replica, ids: Arc<IdentitySource>, filter: ItemExclusionFilter) -> Self {
        let label = match replica {
            Replica::Remote => "Remote Adapter Tree",
            Replica::Local => "Local Adapter Tree",
        };
        Self {
            replica,
            tree: adapter_tree(label),
            format_version: ADAPTER_TREE_FORMAT_VERSION,
            sync_roots: BTreeMap::new(),
            filter,
            ids,
            last_content_version: 0,
            detected: Vec::new(),
        }
    }

    /// Resume from a previously saved tree
    #[must_use]
    pub fn with_tree(mut self, tree: AdapterTree, format_version: u32) -> Self {
        for id in tree.pre_order(tree.root_id()) {
            self.ids.observe(id);
        }
        self.last_content_version = tree
            .pre_order(tree.root_id())
            .into_iter()
            .filter_map(|id| tree.get(id).map(|model| model.content_version))
            .max()
            .unwrap_or_default();
        self.tree = tree;
        self.format_version = format_version;
        self
    }

    /// Sync roots taking part in synchronization
    pub fn enabled_sync_roots(&self) -> Vec<NodeId> {
        self.sync_roots
            .iter()
            .filter(|(id, root)| root.is_enabled && self.tree.contains(**id))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Updates detected since the last call
    pub fn take_detected_updates(&mut self) -> Vec<DetectedUpdate> {
        std::mem::take(&mut self.detected)
    }

    /// Updates detected and not yet taken
    pub fn detected_updates(&self) -> &[DetectedUpdate] {
        &self.detected
    }

    pub(crate) fn next_content_version(&mut self) -> u64 {
        self.last_content_version += 1;
        self.last_content_version
    }

    /// Name of a node for log messages
    pub(crate) fn display_name(&self, id: NodeId) -> String {
        self.tree
            .get(id)
            .map_or_else(|| format!("Id={id}"), |model| format!("\"{}\" Id={id}", model.name()))
    }
}
