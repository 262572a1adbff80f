//! Sync cycle driver for duplex
//!
//! This crate wires both replica adapters and the reconciliation pipeline into one
//! engine and runs synchronization cycles:
//!
//! - **Detection**: state-based update detection of both replicas, concurrently, each
//!   replica on its own serial scheduler
//! - **Consolidation**: detected updates folded into the Update Trees
//! - **Reconciliation**: the Propagation Tree rebuilt from both Update Trees
//! - **Cancellation**: a cancellation token threaded through every step of a cycle
//!
//! # Examples
//!
//! ```rust
//! use duplex_config::Config;
//! use duplex_engine::SyncEngine;
//! use duplex_sync::SyncState;
//! use duplex_types::FileSystemClient;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(remote: Arc<dyn FileSystemClient>, local: Arc<dyn FileSystemClient>) -> duplex_types::Result<()> {
//! let engine = SyncEngine::new(&Config::default(), remote, local, SyncState::new())?;
//! let report = engine.run_cycle(&CancellationToken::new()).await?;
//! println!("{} nodes to propagate", report.reconciliation.propagation_nodes);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod report;

pub use engine::{EngineBuilder, SyncEngine};
pub use report::CycleReport;
