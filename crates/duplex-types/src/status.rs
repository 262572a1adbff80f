//! Update status bit set and its set algebra
//!
//! An [`UpdateStatus`] describes what happened to a node on one replica since the
//! Synced Tree baseline. Bits compose (`Renamed | Moved`), but `Created` absorbs
//! content and link changes and `Deleted` is terminal. `Restore` only ever travels
//! together with `Created` or `Deleted`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Per-replica change status of a node
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UpdateStatus(u8);

const NAMES: [(UpdateStatus, &str); 6] = [
    (UpdateStatus::CREATED, "Created"),
    (UpdateStatus::EDITED, "Edited"),
    (UpdateStatus::RENAMED, "Renamed"),
    (UpdateStatus::MOVED, "Moved"),
    (UpdateStatus::DELETED, "Deleted"),
    (UpdateStatus::RESTORE, "Restore"),
];

impl UpdateStatus {
    /// No change
    pub const UNCHANGED: Self = Self(0);
    /// Node was created
    pub const CREATED: Self = Self(1);
    /// File content was edited
    pub const EDITED: Self = Self(1 << 1);
    /// Node was renamed within its parent
    pub const RENAMED: Self = Self(1 << 2);
    /// Node was moved to another parent
    pub const MOVED: Self = Self(1 << 3);
    /// Node was deleted
    pub const DELETED: Self = Self(1 << 4);
    /// Creation or deletion restores a previously deleted node
    pub const RESTORE: Self = Self(1 << 5);
    /// Both link changes
    pub const RENAMED_AND_MOVED: Self = Self(Self::RENAMED.0 | Self::MOVED.0);
    /// Every change bit except `RESTORE`
    pub const ALL: Self = Self(
        Self::CREATED.0 | Self::EDITED.0 | Self::RENAMED.0 | Self::MOVED.0 | Self::DELETED.0,
    );

    /// Raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, dropping unknown ones
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & (Self::ALL.0 | Self::RESTORE.0))
    }

    /// True when no bit is set
    pub const fn is_unchanged(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set.
    ///
    /// `Unchanged` is never contained in anything, including itself.
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 != 0 && self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set
    pub const fn contains_any(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Keep only the bits of `other`. `Restore` survives while `Created` or `Deleted` does.
    pub const fn intersect(self, other: Self) -> Self {
        let keep_restore = if other.0 & (Self::DELETED.0 | Self::CREATED.0) != 0 {
            Self::RESTORE.0
        } else {
            0
        };
        Self(self.0 & (other.0 | keep_restore))
    }

    /// Remove the bits of `other`. `Restore` goes away with `Created` or `Deleted`.
    pub const fn minus(self, other: Self) -> Self {
        let drop_restore = if other.0 & (Self::DELETED.0 | Self::CREATED.0) != 0 {
            Self::RESTORE.0
        } else {
            0
        };
        Self(self.0 & !other.0 & !drop_restore)
    }

    /// Combine two statuses of the same node.
    ///
    /// Creation followed by deletion cancels out, deletion supersedes everything, and
    /// creation absorbs later content or link changes. Adding creation to an existing
    /// node, or any change to a deleted one, is a fault.
    pub fn union(self, other: Self) -> Result<Self> {
        if self == other || other.is_unchanged() {
            return Ok(self);
        }
        if self.is_unchanged() {
            return Ok(other);
        }
        if self.contains(Self::CREATED) && other.contains(Self::DELETED) {
            return Ok(Self::UNCHANGED);
        }
        if other.contains(Self::DELETED) {
            return Ok(other);
        }
        if self.contains(Self::CREATED) {
            return Ok(self);
        }
        if other.contains(Self::CREATED) || self.contains(Self::DELETED) {
            return Err(Error::fault(format!(
                "Cannot combine update status {:?} with {:?}",
                self, other
            )));
        }
        Ok(Self(self.0 | other.0))
    }

    /// Individual change bits, `Restore` excluded
    pub fn split(self) -> impl Iterator<Item = Self> {
        NAMES
            .iter()
            .map(|(status, _)| *status)
            .filter(move |status| *status != Self::RESTORE && self.contains(*status))
    }
}

impl BitOr for UpdateStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unchanged() {
            return f.write_str("Unchanged");
        }
        let mut first = true;
        for (status, name) in NAMES {
            if self.contains(status) {
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

impl fmt::Debug for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for UpdateStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut status = Self::UNCHANGED;
        for part in s.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("Unchanged") {
                continue;
            }
            let bit = NAMES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(part))
                .map(|(bit, _)| *bit)
                .ok_or_else(|| Error::other(format!("Unknown update status '{}'", part)))?;
            status = status | bit;
        }
        Ok(status)
    }
}

impl TryFrom<String> for UpdateStatus {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UpdateStatus> for String {
    fn from(value: UpdateStatus) -> Self {
        value.to_string()
    }
}
