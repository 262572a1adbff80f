//! Tree updates shared by the enumeration success steps

use crate::model::{AdapterNodeModel, AdapterTreeExt};
use crate::state::AdapterState;
use crate::status::AdapterNodeStatus;
use duplex_tree::TreeNodeModel;
use duplex_types::{Error, ExternalId, NodeId, NodeInfo, NodeType, Result};
use tracing::{debug, warn};

impl AdapterState {
    /// Validate an observed item against the tree and apply it.
    ///
    /// `node` is the existing node for the item, if one was found. Faults when the
    /// parent does not match, when the item crosses volumes, or when the root would be
    /// updated.
    pub(crate) fn validate_and_update(
        &mut self,
        node: Option<NodeId>,
        incoming: AdapterNodeModel,
        parent: NodeId,
    ) -> Result<()> {
        let label = self.tree.label();
        let parent_model = self.tree.require(parent)?;
        if incoming.parent_id() != parent {
            return Err(Error::fault(format!(
                "{label}: parent Id={} of incoming \"{}\" does not match Id={parent}",
                incoming.parent_id(),
                incoming.name()
            )));
        }
        if let (Some(alt), Some(parent_alt)) = (&incoming.alt_id, &parent_model.alt_id) {
            if !self.tree.is_root(parent) && alt.volume_id != parent_alt.volume_id {
                return Err(Error::fault(format!(
                    "{label}: \"{}\" and its parent Id={parent} belong to different volumes",
                    incoming.name()
                )));
            }
        }
        if node.is_some_and(|id| self.tree.is_root(id)) {
            return Err(Error::fault(format!("{label}: cannot update the tree root")));
        }

        let mut status = incoming.status.without(AdapterNodeStatus::DIRTY_NODE_MASK);
        let current = node.and_then(|id| self.tree.get(id)).cloned();

        match &current {
            None if incoming.is_directory() => {
                status = status.with(AdapterNodeStatus::DIRTY_DESCENDANTS);
            }
            Some(current) if incoming.is_directory() && current.parent_id() != parent => {
                if self.tree.is_branch_dirty(current.id()) || self.tree.is_node_or_branch_deleted(current.id()) {
                    status = status.with(AdapterNodeStatus::DIRTY_DESCENDANTS);
                }
                if parent == current.id() || self.tree.is_descendant_of(parent, current.id()) {
                    self.refuse_cyclic_move(current, parent)?;
                    return Ok(());
                }
            }
            _ => {}
        }

        let node = match current {
            Some(current) => Some(current.id()),
            None => self.edited_file_candidate(&incoming, parent),
        };

        self.detect_node_update(node, Some(incoming.with_status(status)))
    }

    /// A directory reported inside its own subtree: the move is not applied and the
    /// branch is marked for re-enumeration instead
    fn refuse_cyclic_move(&mut self, current: &AdapterNodeModel, parent: NodeId) -> Result<()> {
        warn!(
            "{}: cyclic move of \"{}\" Id={} under Id={} detected",
            self.tree.label(),
            current.name(),
            current.id(),
            parent
        );
        let lost = AdapterNodeStatus::DIRTY_ATTRIBUTES | AdapterNodeStatus::DIRTY_PARENT;
        self.append_dirty_flags(current.id(), lost)?;
        self.append_dirty_flags(current.parent_id(), AdapterNodeStatus::DIRTY_CHILDREN)?;

        let path: Vec<NodeId> = std::iter::once(parent)
            .chain(self.tree.ancestors(parent).map(TreeNodeModel::id))
            .take_while(|id| *id != current.id() && !self.tree.is_root(*id))
            .collect();
        for id in path {
            self.append_dirty_flags(id, lost)?;
        }
        Ok(())
    }

    /// An existing lost file with the same name in the same directory is taken to be
    /// the file the application replaced while editing it
    fn edited_file_candidate(&self, incoming: &AdapterNodeModel, parent: NodeId) -> Option<NodeId> {
        if incoming.is_directory() || self.tree.get(parent).is_some_and(AdapterNodeModel::is_dirty_deleted) {
            return None;
        }
        let mut candidates = self
            .tree
            .children_named(parent, incoming.name())
            .filter(|sibling| !sibling.is_directory());
        let candidate = candidates.next()?;
        if candidates.next().is_some() || candidate.is_dirty_placeholder() {
            return None;
        }
        let suspect = AdapterNodeStatus::DIRTY_ATTRIBUTES
            | AdapterNodeStatus::DIRTY_PARENT
            | AdapterNodeStatus::DIRTY_DELETED;
        if !candidate.status.contains_any(suspect) {
            return None;
        }
        debug!(
            "{}: treating new \"{}\" as an edit of Id={}",
            self.tree.label(),
            incoming.name(),
            candidate.id()
        );
        Some(candidate.id())
    }

    /// Existing node for an alt id. A node of the wrong type is marked deleted and
    /// releases the alt id.
    pub(crate) fn existing_node(&mut self, alt_id: Option<&ExternalId>, node_type: NodeType) -> Result<Option<NodeId>> {
        let Some(existing) = alt_id.and_then(|alt| self.tree.by_alt_id(alt)).cloned() else {
            return Ok(None);
        };
        if existing.node_type() == node_type {
            return Ok(Some(existing.id()));
        }
        warn!(
            "{}: type of \"{}\" Id={} changed to {:?}",
            self.tree.label(),
            existing.name(),
            existing.id(),
            node_type
        );
        self.mark_as_deleted(Some(existing.id()))?;
        if let Some(model) = self.tree.get(existing.id()).cloned() {
            self.detect_node_update(Some(existing.id()), Some(model.with_alt_id(None)))?;
        }
        Ok(None)
    }

    /// Mark a node deleted unless its branch already is
    pub(crate) fn mark_as_deleted(&mut self, node: Option<NodeId>) -> Result<()> {
        let Some(id) = node else {
            return Ok(());
        };
        if self.tree.is_node_or_branch_deleted(id) {
            return Ok(());
        }
        let model = self.tree.require(id)?.clone();
        let mut flags = AdapterNodeStatus::DIRTY_DELETED;
        if model.is_directory() && self.tree.is_branch_dirty(id) {
            flags = flags.with(AdapterNodeStatus::DIRTY_DESCENDANTS);
        }
        self.detect_node_update(Some(id), Some(model.with_flags(flags)))
    }

    /// Add dirty flags to a node
    pub(crate) fn append_dirty_flags(&mut self, id: NodeId, flags: AdapterNodeStatus) -> Result<()> {
        let model = self.tree.require(id)?;
        if model.status.contains(flags) {
            return Ok(());
        }
        let model = model.clone().with_flags(flags);
        self.detect_node_update(Some(id), Some(model))
    }

    /// Check the exclusion filter for an observed item. An item without a known
    /// parent is ignored.
    pub(crate) fn should_be_ignored(&self, existing: Option<NodeId>, info: &NodeInfo, parent: Option<NodeId>) -> bool {
        let Some(parent) = parent else {
            debug!("{}: ignoring \"{}\" with unknown parent", self.tree.label(), info.name);
            return true;
        };
        let ignored = self.filter.should_be_ignored(
            &info.name,
            info.attributes,
            info.placeholder_state,
            self.tree.is_sync_root(parent),
        );
        if ignored {
            if existing.is_some() {
                warn!("{}: existing \"{}\" is now excluded", self.tree.label(), info.name);
            } else {
                debug!("{}: ignoring excluded \"{}\"", self.tree.label(), info.name);
            }
        }
        ignored
    }

    /// Directory node for an alt id
    pub(crate) fn parent_node(&mut self, alt_id: &ExternalId) -> Result<Option<NodeId>> {
        self.existing_node(Some(alt_id), NodeType::Directory)
    }

    /// Delete a node through update detection
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Result<()> {
        if self.tree.contains(id) {
            self.detect_node_update(Some(id), None)?;
        }
        Ok(())
    }

    /// Replace the node's alt id with none
    pub(crate) fn release_alt_id(&mut self, id: NodeId) -> Result<()> {
        let model = self.tree.require(id)?.clone().with_alt_id(None);
        self.detect_node_update(Some(id), Some(model))
    }
}
