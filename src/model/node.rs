//! Node identifiers and node bitmasks.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not, Sub};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Maximum number of nodes in one coax network.
pub const MAX_NODES: usize = 16;

/// Node identifier within the network (`0..MAX_NODES`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u8);

impl NodeId {
    /// Node 0. Also the placeholder "remote" of Network/Node parameters.
    pub const ZERO: NodeId = NodeId(0);

    pub fn new(raw: u8) -> Option<Self> {
        ((raw as usize) < MAX_NODES).then_some(NodeId(raw))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.index() < MAX_NODES
    }

    /// All valid node ids in ascending order.
    pub fn all() -> impl Iterator<Item = NodeId> {
        (0..MAX_NODES as u8).map(NodeId)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of nodes, one bit per node id. Bit `n` set ⇒ node `n` is a member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeMask(pub u32);

impl NodeMask {
    pub const EMPTY: NodeMask = NodeMask(0);
    pub const ALL: NodeMask = NodeMask((1u32 << MAX_NODES) - 1);

    #[inline]
    pub fn single(node: NodeId) -> Self {
        if node.is_valid() { NodeMask(1 << node.0) } else { NodeMask::EMPTY }
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        nodes.into_iter().fold(NodeMask::EMPTY, |m, n| m | NodeMask::single(n))
    }

    #[inline]
    pub fn contains(self, node: NodeId) -> bool {
        node.is_valid() && self.0 & (1 << node.0) != 0
    }

    #[inline]
    pub fn insert(&mut self, node: NodeId) {
        *self = *self | NodeMask::single(node);
    }

    #[inline]
    pub fn remove(&mut self, node: NodeId) {
        *self = *self - NodeMask::single(node);
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 & NodeMask::ALL.0 == 0
    }

    #[inline]
    pub fn len(self) -> usize {
        (self.0 & NodeMask::ALL.0).count_ones() as usize
    }

    /// Lowest member, if any.
    pub fn first(self) -> Option<NodeId> {
        let bits = self.0 & NodeMask::ALL.0;
        (bits != 0).then(|| NodeId(bits.trailing_zeros() as u8))
    }

    /// Members in ascending order.
    pub fn iter(self) -> impl Iterator<Item = NodeId> {
        NodeId::all().filter(move |n| self.contains(*n))
    }

    pub fn nodes(self) -> SmallVec<[NodeId; MAX_NODES]> {
        self.iter().collect()
    }

    /// Rank of `node` among the members (number of members below it).
    pub fn rank_of(self, node: NodeId) -> Option<usize> {
        if !self.contains(node) {
            return None;
        }
        let below = self.0 & ((1u32 << node.0) - 1);
        Some(below.count_ones() as usize)
    }
}

impl BitOr for NodeMask {
    type Output = NodeMask;
    fn bitor(self, rhs: NodeMask) -> NodeMask { NodeMask(self.0 | rhs.0) }
}

impl BitAnd for NodeMask {
    type Output = NodeMask;
    fn bitand(self, rhs: NodeMask) -> NodeMask { NodeMask(self.0 & rhs.0) }
}

impl Sub for NodeMask {
    type Output = NodeMask;
    fn sub(self, rhs: NodeMask) -> NodeMask { NodeMask(self.0 & !rhs.0) }
}

impl Not for NodeMask {
    type Output = NodeMask;
    fn not(self) -> NodeMask { NodeMask(!self.0 & NodeMask::ALL.0) }
}

impl fmt::Display for NodeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}
