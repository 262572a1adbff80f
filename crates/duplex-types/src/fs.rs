//! Data exchanged with the file-system and event-log collaborators

use crate::types::NodeType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Failure classification reported by a file-system client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileSystemErrorCode {
    /// Unclassified failure
    Unknown,
    /// A path component does not exist
    PathNotFound,
    /// The object does not exist
    ObjectNotFound,
    /// The parent directory does not exist
    DirectoryNotFound,
    /// The object is locked by another process
    SharingViolation,
    /// Access was denied
    UnauthorizedAccess,
    /// A sibling with the same name exists
    DuplicateName,
    /// The name is not valid on the replica
    InvalidName,
    /// The object at the path has a different identity
    IdentityMismatch,
    /// The object metadata differs from the expected
    MetadataMismatch,
    /// The directory holds more children than allowed
    TooManyChildren,
    /// The request timed out
    TimedOut,
    /// The replica is not reachable
    Offline,
    /// The storage quota is exhausted
    FreeSpaceExceeded,
    /// The request was cancelled
    Cancelled,
    /// The object cannot be addressed by path
    PathBasedAccessNotSupported,
    /// Only part of the request succeeded
    Partial,
    /// Content failed an integrity check
    IntegrityFailure,
    /// The file changed while it was transferred
    TransferAbortedDueToFileChange,
    /// The file was written too recently to be transferred
    LastWriteTimeTooRecent,
}

/// Typed failure from a file-system client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct FileSystemError {
    /// Failure classification
    pub code: FileSystemErrorCode,
    /// Item id of the object the failure concerns
    pub object_id: Option<String>,
    /// Client message
    pub message: String,
}

impl FileSystemError {
    /// Create a file-system error
    pub fn new(
        code: FileSystemErrorCode,
        object_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            object_id,
            message: message.into(),
        }
    }
}

/// Result of a file-system client call
pub type FsResult<T> = std::result::Result<T, FileSystemError>;

macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident: $repr:ty { $($(#[$cmeta:meta])* $const:ident = $value:expr;)* }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            $($(#[$cmeta])* pub const $const: Self = Self($value);)*

            /// Raw bits
            pub const fn bits(self) -> $repr {
                self.0
            }

            /// True when every bit of `other` is set
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Set the bits of `other`
            pub const fn with(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }
    };
}

flag_set! {
    /// File attribute bits as reported by the replica
    FileAttributes: u32 {
        /// No attribute
        NONE = 0;
        /// Read only
        READ_ONLY = 0x1;
        /// Hidden
        HIDDEN = 0x2;
        /// System
        SYSTEM = 0x4;
        /// Directory
        DIRECTORY = 0x10;
        /// Archive
        ARCHIVE = 0x20;
        /// Device
        DEVICE = 0x40;
        /// Temporary
        TEMPORARY = 0x100;
        /// Reparse point
        REPARSE_POINT = 0x400;
    }
}

flag_set! {
    /// On-demand placeholder state of a local item
    PlaceholderState: u8 {
        /// Not a placeholder
        NONE = 0;
        /// The item is a placeholder
        PLACEHOLDER = 0x1;
        /// The placeholder is in sync with the cloud
        IN_SYNC = 0x2;
        /// The placeholder is corrupted
        INVALID = 0x4;
        /// Content is only partially present
        PARTIAL = 0x8;
    }
}

/// Metadata of one replica item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Item id
    pub id: Option<String>,
    /// Parent item id
    pub parent_id: Option<String>,
    /// Leaf name
    pub name: String,
    /// Path relative to the sync root, for path-based replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Attribute bits
    pub attributes: FileAttributes,
    /// Placeholder state bits
    #[serde(default)]
    pub placeholder_state: PlaceholderState,
    /// Revision identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
    /// Last write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_write_time: Option<DateTime<Utc>>,
    /// Logical size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Size on storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_on_storage: Option<u64>,
}

impl NodeInfo {
    /// Describe a directory
    pub fn directory(id: impl Into<String>, parent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            parent_id: Some(parent_id.into()),
            name: name.into(),
            attributes: FileAttributes::DIRECTORY,
            ..Self::default()
        }
    }

    /// Describe a file
    pub fn file(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: Some(id.into()),
            parent_id: Some(parent_id.into()),
            name: name.into(),
            attributes: FileAttributes::ARCHIVE,
            size: Some(size),
            ..Self::default()
        }
    }

    /// Set the revision identity
    pub fn with_revision(mut self, revision_id: impl Into<String>) -> Self {
        self.revision_id = Some(revision_id.into());
        self
    }

    /// Set additional attribute bits
    pub fn with_attributes(mut self, attributes: FileAttributes) -> Self {
        self.attributes = self.attributes | attributes;
        self
    }

    /// Set the placeholder state
    pub fn with_placeholder_state(mut self, state: PlaceholderState) -> Self {
        self.placeholder_state = state;
        self
    }

    /// Node type derived from the attributes
    pub fn node_type(&self) -> NodeType {
        if self.attributes.contains(FileAttributes::DIRECTORY) {
            NodeType::Directory
        } else {
            NodeType::File
        }
    }

    /// Check whether the item is a directory
    pub fn is_directory(&self) -> bool {
        self.node_type().is_directory()
    }
}

/// A sync root exposed by a replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootInfo {
    /// Sync root identity, stable across sessions
    pub id: u64,
    /// Volume the root lives on
    pub volume_id: u64,
    /// Item id of the root directory on its volume
    pub node_id: String,
    /// Local path, for disk replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Whether items are hydrated on demand
    #[serde(default)]
    pub is_on_demand: bool,
    /// Whether the root takes part in synchronization
    #[serde(default = "enabled")]
    pub is_enabled: bool,
}

const fn enabled() -> bool {
    true
}

impl RootInfo {
    /// Describe an enabled sync root
    pub fn new(id: u64, volume_id: u64, node_id: impl Into<String>) -> Self {
        Self {
            id,
            volume_id,
            node_id: node_id.into(),
            local_path: None,
            is_on_demand: false,
            is_enabled: true,
        }
    }
}

/// Change reported by an event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventLogChangeType {
    /// Item created
    Created,
    /// Item created or moved into the observed scope
    CreatedOrMovedTo,
    /// Item content or metadata changed
    Changed,
    /// Item changed or moved
    ChangedOrMoved,
    /// Item moved or renamed
    Moved,
    /// Item deleted
    Deleted,
    /// Item deleted or moved out of the observed scope
    DeletedOrMovedFrom,
    /// Some changes were dropped; state must be re-enumerated
    Skipped,
    /// The event log failed
    Error,
}

/// One event log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Kind of change
    pub change_type: EventLogChangeType,
    /// Item id
    pub id: Option<String>,
    /// Parent item id
    pub parent_id: Option<String>,
    /// Leaf name
    pub name: Option<String>,
    /// Path, for path-based logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Previous path of a moved item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<PathBuf>,
    /// Attribute bits
    pub attributes: FileAttributes,
    /// Placeholder state bits
    #[serde(default)]
    pub placeholder_state: PlaceholderState,
    /// Last write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_write_time: Option<DateTime<Utc>>,
    /// Logical size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl EventLogEntry {
    /// Create an entry for the given change
    pub fn new(change_type: EventLogChangeType) -> Self {
        Self {
            change_type,
            id: None,
            parent_id: None,
            name: None,
            path: None,
            old_path: None,
            attributes: FileAttributes::NONE,
            placeholder_state: PlaceholderState::NONE,
            last_write_time: None,
            size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_follows_directory_attribute() {
        assert_eq!(NodeInfo::directory("1", "0", "a").node_type(), NodeType::Directory);
        assert_eq!(NodeInfo::file("2", "1", "b", 3).node_type(), NodeType::File);
    }

    #[test]
    fn test_flag_set_operations() {
        let attributes = FileAttributes::SYSTEM | FileAttributes::HIDDEN;
        assert!(attributes.contains(FileAttributes::SYSTEM));
        assert!(!attributes.contains(FileAttributes::SYSTEM | FileAttributes::DIRECTORY));
        assert!(attributes.with(FileAttributes::DIRECTORY).contains(FileAttributes::DIRECTORY));
    }

    #[test]
    fn test_root_info_serde_defaults() {
        let root: RootInfo =
            serde_json::from_str(r#"{"id":3,"volume_id":9,"node_id":"abc"}"#).unwrap();
        assert!(root.is_enabled);
        assert!(!root.is_on_demand);
        assert_eq!(root, RootInfo::new(3, 9, "abc"));
    }
}
