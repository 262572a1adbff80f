//! Arena tree keyed by node id

use crate::model::TreeNodeModel;
use crate::operation::{Operation, OperationType};
use duplex_types::{Error, NodeId, Result};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry<M> {
    model: M,
    children: BTreeSet<NodeId>,
}

/// Inverse of one structural change, recorded while a transaction is open
#[derive(Debug, Clone)]
enum Undo<M> {
    /// The node was created
    Created(NodeId),
    /// The node held this model before an edit, move or update
    Replaced(M),
    /// The subtree was removed; models in pre-order
    Removed(Vec<M>),
}

/// File-system tree stored as a flat table of nodes.
///
/// Parent and child links are ids resolved through the table. Alternate ids, where a
/// model has one, are unique and indexed for lookup.
///
/// While a transaction is open the tree journals the inverse of every change, so that
/// rolling back costs as much as the changes made, not as much as the tree.
#[derive(Debug, Clone)]
pub struct FileSystemTree<M: TreeNodeModel> {
    label: &'static str,
    root_id: NodeId,
    nodes: HashMap<NodeId, Entry<M>>,
    alt_index: HashMap<M::AltId, NodeId>,
    journal: Option<Vec<Undo<M>>>,
}

impl<M: TreeNodeModel> FileSystemTree<M> {
    /// Create a tree holding only `root`
    pub fn new(label: &'static str, root: M) -> Self {
        let root_id = root.id();
        let mut alt_index = HashMap::new();
        if let Some(alt_id) = root.alt_id() {
            alt_index.insert(alt_id.clone(), root_id);
        }
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id,
            Entry {
                model: root,
                children: BTreeSet::new(),
            },
        );
        Self {
            label,
            root_id,
            nodes,
            alt_index,
            journal: None,
        }
    }

    /// Name used in log messages and faults
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Id of the root node
    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    /// Root model
    pub fn root(&self) -> &M {
        &self.nodes[&self.root_id].model
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Check whether `id` is the root
    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root_id
    }

    /// Node by id
    pub fn get(&self, id: NodeId) -> Option<&M> {
        self.nodes.get(&id).map(|entry| &entry.model)
    }

    /// Node by id; a missing node is a fault
    pub fn require(&self, id: NodeId) -> Result<&M> {
        self.get(id).ok_or_else(|| Error::missing_node(self.label, id))
    }

    /// Check whether a node exists
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Node by alternate id
    pub fn by_alt_id(&self, alt_id: &M::AltId) -> Option<&M> {
        self.alt_index.get(alt_id).and_then(|id| self.get(*id))
    }

    /// Parent of a node; `None` for the root and unknown ids
    pub fn parent(&self, id: NodeId) -> Option<&M> {
        if self.is_root(id) {
            return None;
        }
        self.get(id).and_then(|model| self.get(model.parent_id()))
    }

    /// Children of a node in id order
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &M> + '_ {
        self.nodes
            .get(&id)
            .into_iter()
            .flat_map(|entry| entry.children.iter())
            .filter_map(move |child| self.get(*child))
    }

    /// Ids of the children of a node
    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|entry| entry.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Children of `parent_id` named `name`
    pub fn children_named<'a>(
        &'a self,
        parent_id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = &'a M> + 'a {
        self.children(parent_id).filter(move |child| child.name() == name)
    }

    /// True when the node exists and has no children
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|entry| entry.children.is_empty())
    }

    /// Ancestors of a node from its parent up to and including the root
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_, M> {
        Ancestors {
            tree: self,
            next: if self.is_root(id) {
                None
            } else {
                self.get(id).map(TreeNodeModel::parent_id)
            },
        }
    }

    /// Check whether `ancestor` is a proper ancestor of `id`
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(id).any(|model| model.id() == ancestor)
    }

    /// Ids of the subtree at `start` in pre-order
    pub fn pre_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.nodes.get(&id) {
                order.push(id);
                stack.extend(entry.children.iter().rev());
            }
        }
        order
    }

    /// Ids of the subtree at `start` in post-order
    pub fn post_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![(start, false)];
        while let Some((id, expanded)) = stack.pop() {
            let Some(entry) = self.nodes.get(&id) else {
                continue;
            };
            if expanded {
                order.push(id);
            } else {
                stack.push((id, true));
                stack.extend(entry.children.iter().rev().map(|child| (*child, false)));
            }
        }
        order
    }

    /// Start journaling changes. An open transaction is committed first.
    pub fn begin_transaction(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Keep the changes made since [`begin_transaction`](Self::begin_transaction)
    pub fn commit_transaction(&mut self) {
        self.journal = None;
    }

    /// Undo the changes made since [`begin_transaction`](Self::begin_transaction),
    /// newest first. Without an open transaction this does nothing.
    pub fn rollback_transaction(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        debug!("{}: rolling back {} changes", self.label, journal.len());
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Created(id) => self.detach(id),
                Undo::Replaced(model) => self.restore(model),
                Undo::Removed(models) => models.into_iter().for_each(|model| self.attach(model)),
            }
        }
    }

    fn record(&mut self, undo: Undo<M>) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    /// Remove every node except the root
    pub fn clear(&mut self) {
        if self.journal.is_some() {
            let removed: Vec<M> = self
                .pre_order(self.root_id)
                .into_iter()
                .skip(1)
                .filter_map(|id| self.get(id).cloned())
                .collect();
            self.record(Undo::Removed(removed));
        }
        let root_id = self.root_id;
        self.nodes.retain(|id, _| *id == root_id);
        if let Some(root) = self.nodes.get_mut(&root_id) {
            root.children.clear();
        }
        self.alt_index.retain(|_, id| *id == root_id);
        debug!("{}: cleared", self.label);
    }

    /// Apply a sequence of operations
    pub fn execute_all<I>(&mut self, operations: I) -> Result<()>
    where
        I: IntoIterator<Item = Operation<M>>,
    {
        operations
            .into_iter()
            .try_for_each(|operation| self.execute(operation))
    }

    /// Apply one operation
    pub fn execute(&mut self, operation: Operation<M>) -> Result<()> {
        let Operation { kind, model } = operation;
        debug!(
            "{}: {:?} {}/{} \"{}\"",
            self.label,
            kind,
            model.parent_id(),
            model.id(),
            model.name()
        );
        match kind {
            OperationType::Create => self.create(model),
            OperationType::Edit => self.modify(model, |current, incoming| {
                current.copy_attributes_from(incoming);
                current.copy_metadata_from(incoming);
            }),
            OperationType::Move => self.move_node(model),
            OperationType::Update => self.modify(model, |current, incoming| {
                current.copy_metadata_from(incoming);
            }),
            OperationType::Delete => self.delete(model.id()),
        }
    }

    /// Remove the node at `start` and then its ancestors for as long as each is a
    /// non-root leaf matching `removable`
    pub fn remove_leaves_while<F>(&mut self, start: NodeId, removable: F) -> Result<()>
    where
        F: Fn(&M) -> bool,
    {
        let mut id = start;
        loop {
            let Some(model) = self.get(id) else {
                return Ok(());
            };
            if self.is_root(id) || !self.is_leaf(id) || !removable(model) {
                return Ok(());
            }
            let parent_id = model.parent_id();
            self.execute(Operation::delete(model.clone()))?;
            id = parent_id;
        }
    }

    fn create(&mut self, model: M) -> Result<()> {
        let id = model.id();
        if self.nodes.contains_key(&id) {
            return Err(Error::tree(format!("{}: node Id={} already exists", self.label, id)));
        }
        self.check_parent(id, model.parent_id())?;
        if let Some(alt_id) = model.alt_id() {
            if self.alt_index.contains_key(alt_id) {
                return Err(Error::tree(format!(
                    "{}: AltId {:?} of node Id={} is already in use",
                    self.label, alt_id, id
                )));
            }
            self.alt_index.insert(alt_id.clone(), id);
        }
        if let Some(parent) = self.nodes.get_mut(&model.parent_id()) {
            parent.children.insert(id);
        }
        self.nodes.insert(
            id,
            Entry {
                model,
                children: BTreeSet::new(),
            },
        );
        self.record(Undo::Created(id));
        Ok(())
    }

    fn move_node(&mut self, model: M) -> Result<()> {
        let id = model.id();
        if self.is_root(id) {
            return Err(Error::tree(format!("{}: cannot move the root", self.label)));
        }
        let new_parent = model.parent_id();
        if new_parent == id || self.is_descendant_of(new_parent, id) {
            return Err(Error::tree(format!(
                "{}: moving node Id={} under Id={} creates a cycle",
                self.label, id, new_parent
            )));
        }
        self.check_parent(id, new_parent)?;
        let old_parent = self.require_entry(id)?.model.parent_id();
        self.modify(model, |current, incoming| {
            current.copy_link_from(incoming);
            current.copy_metadata_from(incoming);
        })?;
        if old_parent != new_parent {
            if let Some(parent) = self.nodes.get_mut(&old_parent) {
                parent.children.remove(&id);
            }
            if let Some(parent) = self.nodes.get_mut(&new_parent) {
                parent.children.insert(id);
            }
        }
        Ok(())
    }

    fn modify<F>(&mut self, model: M, apply: F) -> Result<()>
    where
        F: FnOnce(&mut M, &M),
    {
        let id = model.id();
        let label = self.label;
        let entry = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| Error::tree(format!("{}: node Id={} does not exist", label, id)))?;
        let old_alt = entry.model.alt_id().cloned();
        let mut updated = entry.model.clone();
        apply(&mut updated, &model);
        let new_alt = updated.alt_id().cloned();
        if old_alt != new_alt {
            if let Some(alt_id) = &new_alt {
                if self.alt_index.get(alt_id).is_some_and(|owner| *owner != id) {
                    return Err(Error::tree(format!(
                        "{}: AltId {:?} of node Id={} is already in use",
                        label, alt_id, id
                    )));
                }
            }
            if let Some(alt_id) = &old_alt {
                if self.alt_index.get(alt_id) == Some(&id) {
                    self.alt_index.remove(alt_id);
                }
            }
            if let Some(alt_id) = new_alt {
                self.alt_index.insert(alt_id, id);
            }
        }
        if let Some(entry) = self.nodes.get_mut(&id) {
            let previous = std::mem::replace(&mut entry.model, updated);
            self.record(Undo::Replaced(previous));
        }
        Ok(())
    }

    fn delete(&mut self, id: NodeId) -> Result<()> {
        if self.is_root(id) {
            return Err(Error::tree(format!("{}: cannot delete the root", self.label)));
        }
        let parent_id = self.require_entry(id)?.model.parent_id();
        if self.journal.is_some() {
            let removed = self
                .pre_order(id)
                .into_iter()
                .filter_map(|node| self.get(node).cloned())
                .collect();
            self.record(Undo::Removed(removed));
        }
        for removed in self.post_order(id) {
            if let Some(entry) = self.nodes.remove(&removed) {
                if let Some(alt_id) = entry.model.alt_id() {
                    if self.alt_index.get(alt_id) == Some(&removed) {
                        self.alt_index.remove(alt_id);
                    }
                }
            }
        }
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.remove(&id);
        }
        Ok(())
    }

    /// Undo a creation; later changes below the node are already undone
    fn detach(&mut self, id: NodeId) {
        let Some(entry) = self.nodes.remove(&id) else {
            return;
        };
        if let Some(alt_id) = entry.model.alt_id() {
            if self.alt_index.get(alt_id) == Some(&id) {
                self.alt_index.remove(alt_id);
            }
        }
        if let Some(parent) = self.nodes.get_mut(&entry.model.parent_id()) {
            parent.children.remove(&id);
        }
    }

    /// Undo a removal, parents first
    fn attach(&mut self, model: M) {
        let id = model.id();
        if let Some(alt_id) = model.alt_id() {
            self.alt_index.insert(alt_id.clone(), id);
        }
        if let Some(parent) = self.nodes.get_mut(&model.parent_id()) {
            parent.children.insert(id);
        }
        self.nodes.insert(
            id,
            Entry {
                model,
                children: BTreeSet::new(),
            },
        );
    }

    /// Undo a replacement, relinking the node when its parent changed
    fn restore(&mut self, model: M) {
        let id = model.id();
        let Some(entry) = self.nodes.get_mut(&id) else {
            return;
        };
        let current = std::mem::replace(&mut entry.model, model);
        let restored = &entry.model;
        let (old_parent, new_parent) = (current.parent_id(), restored.parent_id());
        let (old_alt, new_alt) = (current.alt_id().cloned(), restored.alt_id().cloned());
        if old_parent != new_parent && !self.is_root(id) {
            if let Some(parent) = self.nodes.get_mut(&old_parent) {
                parent.children.remove(&id);
            }
            if let Some(parent) = self.nodes.get_mut(&new_parent) {
                parent.children.insert(id);
            }
        }
        if old_alt != new_alt {
            if let Some(alt_id) = old_alt {
                if self.alt_index.get(&alt_id) == Some(&id) {
                    self.alt_index.remove(&alt_id);
                }
            }
            if let Some(alt_id) = new_alt {
                self.alt_index.insert(alt_id, id);
            }
        }
    }

    fn check_parent(&self, id: NodeId, parent_id: NodeId) -> Result<()> {
        match self.get(parent_id) {
            None => Err(Error::tree(format!(
                "{}: parent Id={} of node Id={} does not exist",
                self.label, parent_id, id
            ))),
            Some(parent) if !parent.is_directory() => Err(Error::tree(format!(
                "{}: parent Id={} of node Id={} is not a directory",
                self.label, parent_id, id
            ))),
            Some(_) => Ok(()),
        }
    }

    fn require_entry(&self, id: NodeId) -> Result<&Entry<M>> {
        self.nodes
            .get(&id)
            .ok_or_else(|| Error::tree(format!("{}: node Id={} does not exist", self.label, id)))
    }
}

/// Iterator over the ancestors of a node
pub struct Ancestors<'a, M: TreeNodeModel> {
    tree: &'a FileSystemTree<M>,
    next: Option<NodeId>,
}

impl<'a, M: TreeNodeModel> Iterator for Ancestors<'a, M> {
    type Item = &'a M;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        let model = self.tree.get(id)?;
        if !self.tree.is_root(id) {
            self.next = Some(model.parent_id());
        }
        Some(model)
    }
}
