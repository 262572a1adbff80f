//! Outcome of one sync cycle

use duplex_adapter::DetectionReport;
use duplex_sync::ReconciliationReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What one cycle detected and reconciled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Remote detection counts
    pub remote: DetectionReport,
    /// Local detection counts
    pub local: DetectionReport,
    /// Remote updates folded into the remote Update Tree
    pub remote_updates: usize,
    /// Local updates folded into the local Update Tree
    pub local_updates: usize,
    /// Conflicts and the size of the resulting Propagation Tree
    pub reconciliation: ReconciliationReport,
}

impl CycleReport {
    /// Whether the cycle left anything to propagate
    pub const fn has_pending_changes(&self) -> bool {
        self.reconciliation.propagation_nodes > 0
    }

    /// Whether a replica failed to enumerate some nodes
    pub const fn has_failures(&self) -> bool {
        self.remote.failed > 0 || self.local.failed > 0
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "remote: {} update(s), {} failed; local: {} update(s), {} failed; {} conflict(s), {} node(s) to propagate",
            self.remote_updates,
            self.remote.failed,
            self.local_updates,
            self.local.failed,
            self.reconciliation.real_conflicts().count(),
            self.reconciliation.propagation_nodes
        )
    }
}
