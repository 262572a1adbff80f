//! Adapter node status flags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Dirty flags and state markers of an Adapter Tree node
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterNodeStatus(u32);

const NAMES: [(AdapterNodeStatus, &str); 11] = [
    (AdapterNodeStatus::DIRTY_PLACEHOLDER, "DirtyPlaceholder"),
    (AdapterNodeStatus::DIRTY_ATTRIBUTES, "DirtyAttributes"),
    (AdapterNodeStatus::DIRTY_PARENT, "DirtyParent"),
    (AdapterNodeStatus::DIRTY_DELETED, "DirtyDeleted"),
    (AdapterNodeStatus::DIRTY_CHILDREN, "DirtyChildren"),
    (AdapterNodeStatus(32), "DirtyDescendants"),
    (AdapterNodeStatus::DIRTY_COPIED_FROM, "DirtyCopiedFrom"),
    (AdapterNodeStatus::DIRTY_COPIED_TO, "DirtyCopiedTo"),
    (AdapterNodeStatus::SYNCED, "Synced"),
    (AdapterNodeStatus::STATE_UPDATE_PENDING, "StateUpdatePending"),
    (AdapterNodeStatus::HYDRATION_PENDING, "HydrationPending"),
];

impl AdapterNodeStatus {
    /// No flag
    pub const NONE: Self = Self(0);
    /// Created speculatively, existence not yet confirmed. Always a childless directory.
    pub const DIRTY_PLACEHOLDER: Self = Self(1);
    /// Metadata needs refresh
    pub const DIRTY_ATTRIBUTES: Self = Self(1 << 1);
    /// Parent is unknown, the node is lost
    pub const DIRTY_PARENT: Self = Self(1 << 2);
    /// Removed from the replica while the branch was dirty
    pub const DIRTY_DELETED: Self = Self(1 << 3);
    /// Directory listing needs refresh
    pub const DIRTY_CHILDREN: Self = Self(1 << 4);
    /// Subtree needs deep refresh; implies `DIRTY_CHILDREN`
    pub const DIRTY_DESCENDANTS: Self = Self((1 << 5) | (1 << 4));
    /// Source of a copy that replaced a move; keeps its branch from being deleted
    pub const DIRTY_COPIED_FROM: Self = Self(1 << 6);
    /// Destination of a copy that replaced a move
    pub const DIRTY_COPIED_TO: Self = Self(1 << 7);
    /// Flags describing the node itself
    pub const DIRTY_NODE_MASK: Self = Self(
        Self::DIRTY_PLACEHOLDER.0 | Self::DIRTY_ATTRIBUTES.0 | Self::DIRTY_PARENT.0 | Self::DIRTY_DELETED.0,
    );
    /// Every dirty flag
    pub const DIRTY_MASK: Self = Self(
        Self::DIRTY_NODE_MASK.0
            | Self::DIRTY_DESCENDANTS.0
            | Self::DIRTY_COPIED_FROM.0
            | Self::DIRTY_COPIED_TO.0,
    );
    /// State matches the Synced Tree
    pub const SYNCED: Self = Self(1 << 16);
    /// Placeholder state update pending on an on-demand file system
    pub const STATE_UPDATE_PENDING: Self = Self(1 << 17);
    /// Hydration pending on an on-demand file system
    pub const HYDRATION_PENDING: Self = Self(1 << 18);
    /// Both pending markers
    pub const STATE_UPDATE_FLAGS_MASK: Self =
        Self(Self::STATE_UPDATE_PENDING.0 | Self::HYDRATION_PENDING.0);

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set
    pub const fn contains_any(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Set the bits of `other`
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Clear the bits of `other`
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Replace every dirty flag with `flags`
    pub const fn with_dirty_flags(self, flags: Self) -> Self {
        Self((self.0 & !Self::DIRTY_MASK.0) | flags.0)
    }

    /// Keep only the bits of `other`
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl BitOr for AdapterNodeStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl fmt::Display for AdapterNodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("None");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AdapterNodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdapterNodeStatus({self})")
    }
}
