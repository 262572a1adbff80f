//! Conflict classification shared by detection and resolution

use duplex_types::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of conflict between the changes of the two replicas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictType {
    /// Both replicas renamed the node to different names or moved it to different parents
    MoveMoveSource,
    /// A moved node takes a name already used at its destination
    MoveMoveDest,
    /// Moving the node under its own descendant
    MoveMoveCycle,
    /// Moving or renaming into a deleted destination
    MoveParentDeleteDest,
    /// Two created nodes take the same name
    CreateCreate,
    /// Creating under a deleted parent
    CreateParentDelete,
    /// A created node and a moved node take the same name
    MoveCreate,
    /// Both replicas edited the file
    EditEdit,
    /// One replica edited the file, the other deleted it
    EditDelete,
    /// One replica edited the file, the other deleted an ancestor
    EditParentDelete,
    /// One replica moved the node, the other deleted it
    MoveDelete,
    /// Both replicas created the same node
    CreateCreatePseudo,
    /// Both replicas made the same edit
    EditEditPseudo,
    /// Both replicas made the same rename or move
    MoveMovePseudo,
    /// Both replicas deleted the node
    DeleteDeletePseudo,
}

impl ConflictType {
    /// True for conflicts where both replicas reached the same result
    pub const fn is_pseudo(self) -> bool {
        matches!(
            self,
            Self::CreateCreatePseudo
                | Self::EditEditPseudo
                | Self::MoveMovePseudo
                | Self::DeleteDeletePseudo
        )
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MoveMoveSource => "Move-Move (Source)",
            Self::MoveMoveDest => "Move-Move (Dest)",
            Self::MoveMoveCycle => "Move-Move (Cycle)",
            Self::MoveParentDeleteDest => "Move-ParentDelete (Dest)",
            Self::CreateCreate => "Create-Create",
            Self::CreateParentDelete => "Create-ParentDelete",
            Self::MoveCreate => "Move-Create",
            Self::EditEdit => "Edit-Edit",
            Self::EditDelete => "Edit-Delete",
            Self::EditParentDelete => "Edit-ParentDelete",
            Self::MoveDelete => "Move-Delete",
            Self::CreateCreatePseudo => "Create-Create (Pseudo)",
            Self::EditEditPseudo => "Edit-Edit (Pseudo)",
            Self::MoveMovePseudo => "Move-Move (Pseudo)",
            Self::DeleteDeletePseudo => "Delete-Delete (Pseudo)",
        };
        f.write_str(name)
    }
}

/// A conflict met while reconciling a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Node the conflict was detected on, in the Propagation Tree id space
    pub node_id: NodeId,
    /// Classification
    pub conflict_type: ConflictType,
}

impl Conflict {
    /// Create a conflict record
    pub const fn new(node_id: NodeId, conflict_type: ConflictType) -> Self {
        Self {
            node_id,
            conflict_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ConflictType::EditEditPseudo, true)]
    #[case(ConflictType::DeleteDeletePseudo, true)]
    #[case(ConflictType::EditEdit, false)]
    #[case(ConflictType::MoveMoveCycle, false)]
    fn test_pseudo_classification(#[case] conflict: ConflictType, #[case] expected: bool) {
        assert_eq!(conflict.is_pseudo(), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConflictType::MoveParentDeleteDest.to_string(), "Move-ParentDelete (Dest)");
    }
}
