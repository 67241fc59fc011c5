/// The allocation state of a single node inside the buddy tree.
///
/// An unsplit node is either completely free or completely handed out,
/// so its capacity is implied by the variant and the size of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// The whole range of the node is available.
    Free,
    /// The whole range of the node was handed out by a single allocation.
    Allocated,
    /// The node is divided into two independently tracked children.
    Split {
        /// The largest number of contiguous pages that are free
        /// in either child.
        largest: u32,
    },
}

impl NodeState {
    /// Returns the largest number of contiguous free pages inside a node
    /// of `block_size` pages that is in this state.
    pub const fn capacity(self, block_size: usize) -> usize {
        match self {
            NodeState::Free => block_size,
            NodeState::Allocated => 0,
            NodeState::Split { largest } => largest as usize,
        }
    }

    /// Checks if this node is divided into children.
    pub const fn is_split(self) -> bool {
        matches!(self, NodeState::Split { .. })
    }
}
