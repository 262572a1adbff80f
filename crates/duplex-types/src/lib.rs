//! Core types, status algebra and collaborator contracts for duplex
//!
//! This crate provides the vocabulary shared by every duplex crate:
//!
//! - **Error handling**: one error type separating recoverable file-system failures from faults
//! - **Update status**: the per-replica change bit set with its set algebra
//! - **Identity**: node ids, external ids and the shared id source
//! - **Contracts**: the file-system, event-log and naming collaborators the core talks to
//!
//! # Examples
//!
//! ```rust
//! use duplex_types::{Result, UpdateStatus};
//!
//! fn combined() -> Result<UpdateStatus> {
//!     UpdateStatus::RENAMED.union(UpdateStatus::MOVED)
//! }
//!
//! assert_eq!(combined().unwrap(), UpdateStatus::RENAMED_AND_MOVED);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod fs;
pub mod result;
pub mod status;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorKind, ErrorSeverity};
pub use fs::{
    EventLogChangeType, EventLogEntry, FileAttributes, FileSystemError, FileSystemErrorCode,
    FsResult, NodeInfo, PlaceholderState, RootInfo,
};
pub use result::Result;
pub use status::UpdateStatus;
pub use traits::*;
pub use types::*;
