//! Arena file-system trees and node models for duplex
//!
//! Every tree is a flat table of node models keyed by [`NodeId`](duplex_types::NodeId),
//! with parent and child links expressed as ids. Trees optionally index an alternate
//! id so that nodes can be found from the counterpart tree.
//!
//! - **Synced Tree**: the baseline both replicas agreed on
//! - **Update Trees**: per-replica pending changes with an [`UpdateStatus`](duplex_types::UpdateStatus)
//! - **Propagation Tree**: merged changes with a status per replica
//! - [`SerialScheduler`]: the single-writer actor each tree lives on
//!
//! # Examples
//!
//! ```rust
//! use duplex_tree::{Operation, SyncedNodeModel, SyncedTree, TreeNodeModel};
//! use duplex_types::NodeId;
//!
//! let mut tree = SyncedTree::default();
//! let docs = SyncedNodeModel::directory(NodeId::new(1), NodeId::ROOT, "Docs", NodeId::new(2));
//! tree.execute(Operation::create(docs)).unwrap();
//! assert_eq!(tree.by_alt_id(&NodeId::new(2)).unwrap().name(), "Docs");
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod model;
pub mod operation;
pub mod propagation;
pub mod scheduler;
pub mod synced;
pub mod traversal;
pub mod tree;
pub mod update;

pub use model::{NodeModel, TreeNodeModel};
pub use operation::{equalize_operations, Operation, OperationType};
pub use propagation::{PropagationNodeModel, PropagationTree};
pub use scheduler::{SerialScheduler, Transactional};
pub use synced::{SyncedNodeModel, SyncedTree};
pub use traversal::PreOrder;
pub use tree::{Ancestors, FileSystemTree};
pub use update::{UpdateNodeModel, UpdateTree};
