//! Enumeration units of state-based update detection
//!
//! Each unit reads the Adapter Tree on the adapter's scheduler, performs its file-system
//! call outside of it, and marshals every result back as a scheduled step. Because the
//! tree may change between steps, every step first re-checks its preconditions and
//! escapes when they no longer hold.

mod children;
mod failure;
mod node;
mod root;
mod success;

pub use children::enumerate_children;
pub use node::enumerate_node;
pub use root::enumerate_roots;

use crate::model::{AdapterNodeModel, AdapterTreeExt};
use crate::state::AdapterState;
use duplex_types::{Error, FileSystemErrorCode, NodeId, Result};

/// Why an enumeration step stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// The tree no longer satisfies the step's preconditions; the unit is skipped
    Aborted,
    /// An invariant is broken
    Fault(Error),
}

impl From<Error> for Interrupt {
    fn from(error: Error) -> Self {
        Self::Fault(error)
    }
}

/// Result of an enumeration step
pub type Escape<T> = std::result::Result<T, Interrupt>;

/// Result of one enumeration unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The replica was read and the tree updated
    Succeeded,
    /// The node did not need enumeration
    Unchanged,
    /// The tree changed under the unit and the unit gave up
    Skipped,
    /// The replica reported a failure
    Failed(FileSystemErrorCode),
}

impl Outcome {
    /// A failure that still counts as a completed unit
    pub const fn is_success(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Unchanged | Self::Failed(FileSystemErrorCode::PathBasedAccessNotSupported)
        )
    }

    /// A failure caused by the replica changing during enumeration
    pub const fn is_skipped(self) -> bool {
        matches!(
            self,
            Self::Skipped
                | Self::Failed(
                    FileSystemErrorCode::DirectoryNotFound
                        | FileSystemErrorCode::PathNotFound
                        | FileSystemErrorCode::ObjectNotFound
                        | FileSystemErrorCode::IdentityMismatch
                        | FileSystemErrorCode::MetadataMismatch
                )
        )
    }
}

/// Turn a step result into a unit outcome, letting faults through
pub(crate) fn settle(result: Escape<Outcome>) -> Result<Outcome> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(Interrupt::Aborted) => Ok(Outcome::Skipped),
        Err(Interrupt::Fault(error)) => Err(error),
    }
}

impl AdapterState {
    /// The node, or an escape when it has been removed
    pub(crate) fn existing(&self, id: NodeId) -> Escape<&AdapterNodeModel> {
        self.tree.get(id).ok_or(Interrupt::Aborted)
    }

    /// Escape unless the children of the node can be enumerated
    pub(crate) fn ensure_children_enumerable(&self, id: NodeId) -> Escape<&AdapterNodeModel> {
        let model = self.existing(id)?;
        if self.tree.is_root(id) {
            return Ok(model);
        }
        if model.is_lost_or_deleted() || !self.tree.is_branch_stable(id) {
            return Err(Interrupt::Aborted);
        }
        Ok(model)
    }

    /// Escape unless the node itself can be enumerated
    pub(crate) fn ensure_node_enumerable(&self, id: NodeId) -> Escape<&AdapterNodeModel> {
        let model = self.existing(id)?;
        if self.tree.is_root(id) {
            return Ok(model);
        }
        // A lost node is still enumerable while its own metadata is pending
        let lost_with_dirty_attributes = model.is_lost_or_deleted()
            && !model.is_dirty_deleted()
            && model.has_dirty_attributes();
        if (model.is_lost_or_deleted() && !lost_with_dirty_attributes) || !self.tree.is_branch_stable(id) {
            return Err(Interrupt::Aborted);
        }
        Ok(model)
    }

    /// Volume the node's items live on
    pub(crate) fn volume_of(&self, id: NodeId) -> u64 {
        self.tree
            .sync_root_of(id)
            .and_then(|root| self.sync_roots.get(&root))
            .map(|root| root.volume_id)
            .or_else(|| self.tree.volume_id(id))
            .unwrap_or_default()
    }
}
