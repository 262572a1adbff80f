//! Update consolidation and reconciliation for duplex
//!
//! This crate turns the changes detected on both replicas into the Propagation Tree,
//! the list of operations that brings both replicas to the same state:
//!
//! - **Consolidation**: folding detected updates into a replica's Update Tree
//! - **Reconciliation**: merging both Update Trees node by node into the Propagation Tree
//! - **Conflict detection**: indirect, pairwise, deletion and name-clash conflicts
//! - **Pseudo conflicts**: the same change made on both replicas, settled without renaming
//! - **Conflict naming**: names for nodes renamed, restored or backed up by a resolution
//!
//! # Examples
//!
//! ```rust
//! use duplex_sync::{ConflictNaming, SyncState};
//! use duplex_tree::{Operation, SyncedNodeModel, TreeNodeModel, UpdateNodeModel};
//! use duplex_types::{NodeId, UpdateStatus};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut state = SyncState::new();
//! state
//!     .synced
//!     .execute(Operation::create(SyncedNodeModel::file(NodeId::new(1), NodeId::ROOT, "old.txt", NodeId::new(101))))
//!     .unwrap();
//! state
//!     .local_updates
//!     .execute(Operation::create(UpdateNodeModel::file(NodeId::new(1), NodeId::ROOT, "new.txt", UpdateStatus::RENAMED)))
//!     .unwrap();
//!
//! let report = state.reconcile(&ConflictNaming::default(), &CancellationToken::new()).unwrap();
//! assert!(report.conflicts.is_empty());
//! assert_eq!(state.propagation.get(NodeId::new(1)).unwrap().name(), "new.txt");
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod conflict;
pub mod consolidation;
pub mod naming;
pub mod reconciliation;
pub mod state;

pub use conflict::{Conflict, ConflictType};
pub use consolidation::UpdateConsolidation;
pub use naming::{ConflictNameFactory, ConflictNaming};
pub use reconciliation::{ReconciliationPipeline, ReconciliationReport};
pub use state::{SyncSnapshot, SyncState};
