//! Deletion of nodes that enumeration could not find

use crate::state::AdapterState;
use crate::traversal::{deletable_nodes, DirtyNodesTraversal};
use duplex_types::{NodeId, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

impl AdapterState {
    /// Delete lost and deleted nodes of every volume whose sync roots are fully
    /// enumerated. Returns the number of deleted branches.
    pub fn detect_deletions(&mut self) -> Result<usize> {
        let mut volumes: BTreeMap<u64, Vec<NodeId>> = BTreeMap::new();
        for id in self.enabled_sync_roots() {
            if let Some(root) = self.sync_roots.get(&id) {
                volumes.entry(root.volume_id).or_default().push(id);
            }
        }

        let mut deleted = 0;
        for (volume_id, roots) in volumes {
            if let Some(pending) = roots
                .iter()
                .find_map(|root| DirtyNodesTraversal::new(*root).next_in(&self.tree))
            {
                info!(
                    "{}: {} still needs enumeration, deletions on volume {} postponed",
                    self.tree.label(),
                    self.display_name(pending),
                    volume_id
                );
                continue;
            }
            debug!("{}: detecting deletions on volume {}", self.tree.label(), volume_id);
            for root in roots {
                for id in deletable_nodes(&self.tree, root) {
                    if self.tree.contains(id) {
                        self.remove_node(id)?;
                        deleted += 1;
                    }
                }
            }
        }
        Ok(deleted)
    }
}
