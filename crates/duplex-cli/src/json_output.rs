//! JSON output structures for the duplex CLI

use duplex_sync::{Conflict, ReconciliationReport, SyncSnapshot};
use duplex_tree::PropagationNodeModel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete JSON output of the reconcile command
#[derive(Debug, Serialize, Deserialize)]
pub struct ReconcileResultJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Every conflict detected, pseudo conflicts included
    pub conflicts: Vec<Conflict>,
    /// Number of conflicts that renamed, restored or backed up a node
    pub real_conflicts: usize,
    /// Propagation Tree nodes, parents first
    pub propagation: Vec<PropagationNodeModel>,
}

/// Operation metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// duplex version
    pub version: String,
    /// Operation type
    pub operation: String,
    /// Timestamp of the run
    pub timestamp: String,
    /// Scenario file
    pub scenario: String,
}

impl ReconcileResultJson {
    /// Collect the output of one reconciliation
    pub fn new(scenario: &Path, report: &ReconciliationReport, result: SyncSnapshot) -> Self {
        Self {
            metadata: OperationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                operation: "reconcile".to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                scenario: scenario.display().to_string(),
            },
            conflicts: report.conflicts.clone(),
            real_conflicts: report.real_conflicts().count(),
            propagation: result.propagation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_sync::ConflictType;
    use duplex_types::{NodeId, UpdateStatus};

    #[test]
    fn test_result_serialization() {
        let report = ReconciliationReport {
            conflicts: vec![
                Conflict::new(NodeId::new(2), ConflictType::EditEdit),
                Conflict::new(NodeId::new(3), ConflictType::EditEditPseudo),
            ],
            propagation_nodes: 1,
        };
        let snapshot = SyncSnapshot {
            propagation: vec![PropagationNodeModel::file(NodeId::new(2), NodeId::ROOT, "a.txt", NodeId::new(102))
                .with_statuses(UpdateStatus::EDITED, UpdateStatus::UNCHANGED)],
            ..SyncSnapshot::default()
        };

        let output = ReconcileResultJson::new(Path::new("scenario.json"), &report, snapshot);
        let json = serde_json::to_value(&output).unwrap();

        assert_eq!(json["metadata"]["operation"], "reconcile");
        assert_eq!(json["real_conflicts"], 1);
        assert_eq!(json["propagation"][0]["name"], "a.txt");
        assert_eq!(json["propagation"][0]["remote_status"], "Edited");
    }
}
