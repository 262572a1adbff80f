//! Core identity and metadata types shared by every tree

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a node within a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// The root of every tree
    pub const ROOT: Self = Self(0);

    /// Create an id from its raw value
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Check whether this is the root id
    pub const fn is_root(self) -> bool {
        self.0 == Self::ROOT.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Allocates node ids for the trees of one sync pair.
///
/// Both replicas share a source so that remote and local ids never collide.
#[derive(Debug)]
pub struct IdentitySource {
    next: AtomicU64,
}

impl IdentitySource {
    /// Create a source whose first id is `first`
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }

    /// Allocate the next id
    pub fn next_id(&self) -> NodeId {
        NodeId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Make sure future ids are greater than `id`
    pub fn observe(&self, id: NodeId) {
        self.next.fetch_max(id.0 + 1, Ordering::Relaxed);
    }
}

impl Default for IdentitySource {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Regular file
    File,
    /// Directory
    Directory,
}

impl NodeType {
    /// Check whether this is a directory
    pub const fn is_directory(self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// One side of the synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Replica {
    /// Cloud store
    Remote,
    /// Local disk
    Local,
}

impl Replica {
    /// The counterpart replica
    pub const fn other(self) -> Self {
        match self {
            Self::Remote => Self::Local,
            Self::Local => Self::Remote,
        }
    }
}

impl fmt::Display for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("remote"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// File metadata used for equality and conflict checks
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeAttributes {
    /// Revision identity assigned by the replica, if it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
    /// Last write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_write_time: Option<DateTime<Utc>>,
    /// Logical size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Size occupied on the replica's storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_on_storage: Option<u64>,
}

impl NodeAttributes {
    /// Attributes with only a size
    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    /// Set the revision identity
    pub fn revision(mut self, revision_id: impl Into<String>) -> Self {
        self.revision_id = Some(revision_id.into());
        self
    }

    /// Set the last write time
    pub fn written_at(mut self, last_write_time: DateTime<Utc>) -> Self {
        self.last_write_time = Some(last_write_time);
        self
    }

    /// Whether two versions of a file have the same content.
    ///
    /// Sizes must match. Revision identities decide when both sides have one,
    /// otherwise last write times do when both sides have one.
    pub fn same_content(&self, other: &Self) -> bool {
        if self.size != other.size {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.revision_id, &other.revision_id) {
            return a == b;
        }
        match (self.last_write_time, other.last_write_time) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Identity of an item on a replica volume
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExternalId {
    /// Volume the item lives on
    pub volume_id: u64,
    /// Item identity within the volume
    pub item_id: String,
}

impl ExternalId {
    /// Create an external id
    pub fn new(volume_id: u64, item_id: impl Into<String>) -> Self {
        Self {
            volume_id,
            item_id: item_id.into(),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.volume_id, self.item_id)
    }
}
