//! Opaque identifiers for nodes and projections.
//!
//! Both are plain arena indices: the realm owns all node and projection
//! storage and hands out copyable, non-owning ids.

use core::fmt;

/// Unique identifier for a node in a realm.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a node id from its arena index.
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        NodeId(index)
    }

    /// Returns the arena index of this node.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Unique identifier for a projection registered with `connect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectionId(u32);

impl ProjectionId {
    /// Creates a projection id from its index.
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        ProjectionId(index)
    }

    /// Returns the index of this projection.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}
