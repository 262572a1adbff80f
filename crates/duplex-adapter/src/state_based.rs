//! State-based update detection driver

use crate::detection::DetectedUpdate;
use crate::enumeration::{enumerate_children, enumerate_node, enumerate_roots, Outcome};
use crate::state::AdapterState;
use crate::status::AdapterNodeStatus;
use crate::traversal::DirtyNodesTraversal;
use duplex_tree::SerialScheduler;
use duplex_types::{Error, FileSystemClient, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Counts of one detection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Nodes enumerated
    pub succeeded: usize,
    /// Nodes given up on because the tree or the replica changed meanwhile
    pub skipped: usize,
    /// Nodes the replica failed to enumerate
    pub failed: usize,
    /// Lost or deleted branches removed
    pub deleted: usize,
}

impl DetectionReport {
    /// Count one unit outcome
    pub fn record(&mut self, outcome: Outcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else if outcome.is_skipped() {
            self.skipped += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Detects replica changes by enumerating the dirty parts of the Adapter Tree
#[derive(Clone)]
pub struct StateBasedUpdateDetection {
    scheduler: SerialScheduler<AdapterState>,
    client: Arc<dyn FileSystemClient>,
}

impl std::fmt::Debug for StateBasedUpdateDetection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBasedUpdateDetection")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl StateBasedUpdateDetection {
    /// Create a detector for the replica behind `client`
    pub fn new(scheduler: SerialScheduler<AdapterState>, client: Arc<dyn FileSystemClient>) -> Self {
        Self { scheduler, client }
    }

    /// Scheduler owning the Adapter Tree
    pub fn scheduler(&self) -> &SerialScheduler<AdapterState> {
        &self.scheduler
    }

    /// Enumerate the sync roots and request a full rescan of every enabled root
    pub async fn start(&self, cancel: &CancellationToken) -> Result<Outcome> {
        info!("{}: starting state-based update detection", self.scheduler.name());
        let outcome = enumerate_roots(&self.scheduler, self.client.as_ref(), cancel).await?;
        if outcome.is_success() {
            self.scheduler
                .schedule(|state| -> Result<()> {
                    for root in state.enabled_sync_roots() {
                        state.append_dirty_flags(root, AdapterNodeStatus::DIRTY_DESCENDANTS)?;
                    }
                    Ok(())
                })
                .await??;
        }
        Ok(outcome)
    }

    /// Enumerate every dirty node of the enabled sync roots, then detect deletions
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<DetectionReport> {
        let roots = self.scheduler.schedule(|state| state.enabled_sync_roots()).await?;
        let mut report = DetectionReport::default();

        for root in roots {
            let mut traversal = DirtyNodesTraversal::new(root);
            loop {
                if cancel.is_cancelled() {
                    info!("{}: update detection cancelled", self.scheduler.name());
                    return Err(Error::Cancelled);
                }
                let (next, advanced) = self
                    .scheduler
                    .schedule(move |state| {
                        let next = traversal.next_in(&state.tree);
                        (next, traversal)
                    })
                    .await?;
                traversal = advanced;
                let Some(node) = next else {
                    break;
                };
                report.record(self.detect_updates(node, cancel).await?);
            }
        }

        report.deleted = self
            .scheduler
            .schedule_and_commit(AdapterState::detect_deletions)
            .await??;
        info!(
            "{}: state-based update detection finished: {} succeeded, {} skipped, {} failed, {} deleted",
            self.scheduler.name(),
            report.succeeded,
            report.skipped,
            report.failed,
            report.deleted
        );
        Ok(report)
    }

    /// Updates detected since the last call
    pub async fn take_detected_updates(&self) -> Result<Vec<DetectedUpdate>> {
        self.scheduler.schedule(AdapterState::take_detected_updates).await
    }

    async fn detect_updates(&self, node: NodeId, cancel: &CancellationToken) -> Result<Outcome> {
        let outcome = enumerate_node(&self.scheduler, self.client.as_ref(), node, cancel).await?;
        if !matches!(outcome, Outcome::Succeeded | Outcome::Unchanged) {
            debug!("{}: Id={} not enumerated: {:?}", self.scheduler.name(), node, outcome);
            return Ok(outcome);
        }
        enumerate_children(&self.scheduler, self.client.as_ref(), node, cancel).await
    }
}
