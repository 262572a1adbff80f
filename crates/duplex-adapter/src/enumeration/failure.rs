//! Escalation of enumeration failures

use super::{Escape, Interrupt};
use crate::model::AdapterTreeExt;
use crate::state::AdapterState;
use crate::status::AdapterNodeStatus;
use duplex_tree::TreeNodeModel;
use duplex_types::{Error, ExternalId, FileSystemError, FileSystemErrorCode, NodeId};
use tracing::warn;

impl AdapterState {
    /// Mark the part of the tree a failure invalidates.
    ///
    /// A missing directory sends re-enumeration two levels up, a missing or replaced
    /// item one level up, and a metadata mismatch back to the item itself. Failures on
    /// sync roots are only logged. A placeholder that cannot be found is removed.
    pub(crate) fn handle_enumeration_failure(&mut self, error: &FileSystemError, node: NodeId) -> Escape<()> {
        self.existing(node)?;
        if self.tree.is_node_or_branch_deleted(node) {
            return Err(Interrupt::Aborted);
        }

        let failed = error
            .object_id
            .as_ref()
            .filter(|object_id| !object_id.is_empty())
            .zip(self.tree.volume_id(node))
            .and_then(|(object_id, volume_id)| self.tree.by_alt_id(&ExternalId::new(volume_id, object_id.clone())))
            .map(TreeNodeModel::id);

        if let Some(failed) = failed {
            if self.tree.is_root(failed) {
                return Err(Error::fault(format!("{}: failure reported for the tree root", self.tree.label())).into());
            }
            self.escalate_failure(error.code, failed)?;
        }

        let is_placeholder = self.tree.get(node).is_some_and(|model| model.is_dirty_placeholder());
        if is_placeholder
            && matches!(
                error.code,
                FileSystemErrorCode::PathBasedAccessNotSupported | FileSystemErrorCode::PathNotFound
            )
        {
            self.remove_node(node)?;
        }
        Ok(())
    }

    fn escalate_failure(&mut self, code: FileSystemErrorCode, failed: NodeId) -> Escape<()> {
        let parent = self.tree.parent(failed).map(TreeNodeModel::id);
        match code {
            FileSystemErrorCode::DirectoryNotFound => {
                let grandparent = parent.and_then(|parent| self.tree.parent(parent)).map(TreeNodeModel::id);
                if self.tree.is_sync_root(failed) || parent.is_some_and(|parent| self.tree.is_sync_root(parent)) {
                    warn!(
                        "{}: directory of sync root branch {} not found",
                        self.tree.label(),
                        self.display_name(failed)
                    );
                } else if let Some(grandparent) = grandparent {
                    self.append_dirty_flags(grandparent, AdapterNodeStatus::DIRTY_CHILDREN)?;
                }
            }
            FileSystemErrorCode::PathNotFound
            | FileSystemErrorCode::IdentityMismatch
            | FileSystemErrorCode::ObjectNotFound => {
                if self.tree.is_sync_root(failed) {
                    warn!(
                        "{}: sync root {} not found: {:?}",
                        self.tree.label(),
                        self.display_name(failed),
                        code
                    );
                } else if let Some(parent) = parent {
                    self.append_dirty_flags(parent, AdapterNodeStatus::DIRTY_CHILDREN)?;
                }
            }
            FileSystemErrorCode::MetadataMismatch => {
                self.append_dirty_flags(failed, AdapterNodeStatus::DIRTY_ATTRIBUTES)?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::filter::ItemExclusionFilter;
    use crate::model::AdapterNodeModel;
    use crate::state::AdapterState;
    use crate::status::AdapterNodeStatus;
    use duplex_tree::Operation;
    use duplex_types::{ExternalId, FileSystemError, FileSystemErrorCode, IdentitySource, NodeId, Replica};
    use rstest::rstest;
    use std::sync::Arc;

    fn id(value: u64) -> NodeId {
        NodeId::new(value)
    }

    /// root(1) -> a(2) -> b(3) -> c(4), plus placeholder p(5) under a
    fn state() -> AdapterState {
        let mut state = AdapterState::new(Replica::Remote, Arc::new(IdentitySource::default()), ItemExclusionFilter::default());
        let alt = |item: &str| Some(ExternalId::new(1, item));
        state
            .tree
            .execute_all([
                Operation::create(AdapterNodeModel::directory(id(1), id(0), "1").with_alt_id(alt("r"))),
                Operation::create(AdapterNodeModel::directory(id(2), id(1), "a").with_alt_id(alt("a"))),
                Operation::create(AdapterNodeModel::directory(id(3), id(2), "b").with_alt_id(alt("b"))),
                Operation::create(AdapterNodeModel::directory(id(4), id(3), "c").with_alt_id(alt("c"))),
                Operation::create(
                    AdapterNodeModel::directory(id(5), id(2), "p").with_status(AdapterNodeStatus::DIRTY_PLACEHOLDER),
                ),
            ])
            .unwrap();
        state
    }

    fn error(code: FileSystemErrorCode, object: &str) -> FileSystemError {
        FileSystemError::new(code, Some(object.to_owned()), "failed")
    }

    #[rstest]
    #[case(FileSystemErrorCode::DirectoryNotFound, 2, AdapterNodeStatus::DIRTY_CHILDREN)]
    #[case(FileSystemErrorCode::PathNotFound, 3, AdapterNodeStatus::DIRTY_CHILDREN)]
    #[case(FileSystemErrorCode::ObjectNotFound, 3, AdapterNodeStatus::DIRTY_CHILDREN)]
    #[case(FileSystemErrorCode::MetadataMismatch, 4, AdapterNodeStatus::DIRTY_ATTRIBUTES)]
    fn test_failure_escalation(
        #[case] code: FileSystemErrorCode,
        #[case] flagged: u64,
        #[case] flags: AdapterNodeStatus,
    ) {
        let mut state = state();
        state.handle_enumeration_failure(&error(code, "c"), id(4)).unwrap();
        assert!(state.tree.get(id(flagged)).unwrap().status.contains(flags));
    }

    #[test]
    fn test_sharing_violation_changes_nothing() {
        let mut state = state();
        let before = state.tree.clone();
        state
            .handle_enumeration_failure(&error(FileSystemErrorCode::SharingViolation, "c"), id(4))
            .unwrap();
        for node in 1..=5 {
            assert_eq!(state.tree.get(id(node)), before.get(id(node)));
        }
    }

    #[test]
    fn test_missing_placeholder_is_removed() {
        let mut state = state();
        state
            .handle_enumeration_failure(&FileSystemError::new(FileSystemErrorCode::PathNotFound, None, "gone"), id(5))
            .unwrap();
        assert!(!state.tree.contains(id(5)));
        assert!(state.take_detected_updates().is_empty());
    }

    #[test]
    fn test_sync_root_failure_is_only_logged() {
        let mut state = state();
        state
            .handle_enumeration_failure(&error(FileSystemErrorCode::ObjectNotFound, "r"), id(1))
            .unwrap();
        assert!(!state.tree.get(id(0)).unwrap().has_dirty_children());
    }
}
