//! Error types and handling for duplex
//!
//! Two tiers of failure exist. File-system errors describe a divergence between the
//! assumed and the actual replica state; they are absorbed by update detection and
//! retried on a later cycle. Faults describe broken internal invariants; they stop the
//! owning component and fail the whole cycle.

use crate::fs::{FileSystemError, FileSystemErrorCode};
use crate::types::NodeId;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - operation should be retried on a later cycle
    Medium,
    /// High severity - the cycle should be aborted
    High,
    /// Critical severity - the owning component must stop
    Critical,
}

/// Main error type for duplex operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A tree rejected a structural operation
    #[error("Tree error: {message}")]
    Tree {
        /// Description of the rejected operation
        message: String,
    },

    /// An internal invariant does not hold
    #[error("Invariant violated: {message}")]
    Fault {
        /// Description of the broken invariant
        message: String,
    },

    /// The file-system client reported a failure
    #[error("File system error {code:?} on {object_id:?}: {message}")]
    FileSystem {
        /// Failure classification
        code: FileSystemErrorCode,
        /// Identity of the object the failure concerns, if known
        object_id: Option<String>,
        /// Message from the client
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// A serial scheduler is no longer running
    #[error("Scheduler error: {message}")]
    Scheduler {
        /// Error message describing the scheduler issue
        message: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tree structure errors
    Tree,
    /// Invariant violations
    Fault,
    /// File-system client failures
    FileSystem,
    /// Configuration errors
    Config,
    /// Scheduler errors
    Scheduler,
    /// Cancellation
    Cancelled,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Tree { .. } => ErrorKind::Tree,
            Self::Fault { .. } => ErrorKind::Fault,
            Self::FileSystem { .. } => ErrorKind::FileSystem,
            Self::Config { .. } => ErrorKind::Config,
            Self::Scheduler { .. } => ErrorKind::Scheduler,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Tree { .. } => ErrorSeverity::High,
            Self::Fault { .. } => ErrorSeverity::Critical,
            Self::FileSystem { .. } => ErrorSeverity::Medium,
            Self::Config { .. } => ErrorSeverity::High,
            Self::Scheduler { .. } => ErrorSeverity::Critical,
            Self::Cancelled => ErrorSeverity::Low,
            Self::Other { .. } => ErrorSeverity::Medium,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::FileSystem { code, .. } => *code != FileSystemErrorCode::IntegrityFailure,
            Self::Other { .. } => true,
            Self::Tree { .. }
            | Self::Fault { .. }
            | Self::Config { .. }
            | Self::Scheduler { .. }
            | Self::Cancelled => false,
        }
    }

    /// Check if this error should trigger a retry on the next cycle
    pub fn should_retry(&self) -> bool {
        self.is_recoverable() && self.severity() <= ErrorSeverity::Medium
    }

    /// Check if this error is an invariant violation
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }

    /// Create a new tree error
    pub fn tree<S: Into<String>>(message: S) -> Self {
        Self::Tree {
            message: message.into(),
        }
    }

    /// Create a new fault
    pub fn fault<S: Into<String>>(message: S) -> Self {
        Self::Fault {
            message: message.into(),
        }
    }

    /// Create a fault for a node that must exist but does not
    pub fn missing_node(tree: &str, id: NodeId) -> Self {
        Self::fault(format!("{} node with Id={} does not exist", tree, id))
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new scheduler error
    pub fn scheduler<S: Into<String>>(message: S) -> Self {
        Self::Scheduler {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<FileSystemError> for Error {
    fn from(error: FileSystemError) -> Self {
        Self::FileSystem {
            code: error.code,
            object_id: error.object_id,
            message: error.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_error_severity_consistency(message in ".*") {
            let errors = vec![
                Error::tree(message.clone()),
                Error::fault(message.clone()),
                Error::config(message.clone()),
                Error::scheduler(message.clone()),
                Error::other(message.clone()),
            ];

            for error in errors {
                let kind = error.kind();
                match error {
                    Error::Tree { .. } => prop_assert_eq!(kind, ErrorKind::Tree),
                    Error::Fault { .. } => prop_assert_eq!(kind, ErrorKind::Fault),
                    Error::Config { .. } => prop_assert_eq!(kind, ErrorKind::Config),
                    Error::Scheduler { .. } => prop_assert_eq!(kind, ErrorKind::Scheduler),
                    Error::Other { .. } => prop_assert_eq!(kind, ErrorKind::Other),
                    _ => {}
                }

                if error.should_retry() {
                    prop_assert!(error.is_recoverable());
                    prop_assert!(error.severity() <= ErrorSeverity::Medium);
                }
            }
        }
    }

    #[test]
    fn test_faults_are_never_retried() {
        let error = Error::missing_node("Synced Tree", NodeId::new(7));
        assert!(error.is_fault());
        assert_eq!(error.severity(), ErrorSeverity::Critical);
        assert!(!error.should_retry());
        assert!(error.to_string().contains("Id=7"));
    }

    #[test]
    fn test_file_system_error_conversion() {
        let error = Error::from(FileSystemError::new(
            FileSystemErrorCode::SharingViolation,
            Some("42".to_string()),
            "locked",
        ));

        assert_eq!(error.kind(), ErrorKind::FileSystem);
        assert!(error.should_retry());
        assert!(error.to_string().contains("locked"));
    }

    #[test]
    fn test_cancelled_is_not_recoverable() {
        assert!(!Error::Cancelled.is_recoverable());
        assert_eq!(Error::Cancelled.severity(), ErrorSeverity::Low);
    }
}
