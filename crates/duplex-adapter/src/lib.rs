//! Replica adapter for duplex
//!
//! The adapter keeps an Adapter Tree per replica, the last known state of that replica
//! with dirty flags marking what must be re-read. This crate provides:
//!
//! - **Adapter Tree**: node model, dirty flags and branch queries
//! - **Update detection**: applying observed items to the tree and recording the changes
//! - **State-based detection**: root, children and node enumeration driven by dirty flags
//! - **Deletion detection**: removal of nodes enumeration could no longer find
//! - **Exclusion filter**: items that are never synchronized
//! - **Event log**: reference-counted subscriptions to a replica's change notifications
//!
//! # Examples
//!
//! ```rust
//! use duplex_adapter::{AdapterNodeModel, AdapterNodeStatus, AdapterState, ItemExclusionFilter};
//! use duplex_types::{ExternalId, IdentitySource, NodeId, Replica};
//! use std::sync::Arc;
//!
//! let mut state = AdapterState::new(Replica::Local, Arc::new(IdentitySource::default()), ItemExclusionFilter::default());
//! let root = AdapterNodeModel::directory(NodeId::ROOT, NodeId::ROOT, "1")
//!     .with_alt_id(Some(ExternalId::new(1, "root")))
//!     .with_status(AdapterNodeStatus::DIRTY_DESCENDANTS);
//! state.detect_node_update(None, Some(root)).unwrap();
//!
//! assert_eq!(state.take_detected_updates().len(), 1);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod deletion;
pub mod detection;
pub mod enumeration;
pub mod event_log;
pub mod filter;
pub mod model;
pub mod state;
pub mod state_based;
pub mod status;
pub mod traversal;

pub use detection::DetectedUpdate;
pub use enumeration::{Escape, Interrupt, Outcome};
pub use event_log::{EventLogBatch, EventLogSubscription, EventLogSubscriptions};
pub use filter::{ItemExclusionFilter, DEFAULT_IGNORED_EXTENSIONS};
pub use model::{adapter_tree, AdapterNodeModel, AdapterTree, AdapterTreeExt};
pub use state::{AdapterCheckpoint, AdapterState, ADAPTER_TREE_FORMAT_VERSION};
pub use state_based::{DetectionReport, StateBasedUpdateDetection};
pub use status::AdapterNodeStatus;
pub use traversal::{deletable_nodes, DirtyNodesTraversal};
