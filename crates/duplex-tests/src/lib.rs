//! duplex integration testing support
//!
//! This crate provides the shared fixtures of the integration suites under `tests/`:
//! an in-memory replica implementing the file-system client contract, and builders for
//! the trees reconciliation works on.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// In-memory replica
///
/// A mutable item store behind the file-system client contract, with failure
/// injection, used to drive update detection end to end.
pub mod memory_client;

/// Unified test utilities
///
/// Tree builders and helpers shared by the integration suites.
pub mod test_utils;

pub use memory_client::MemoryReplica;
