//! Node identification for snapshot lookup.
//!
//! Proxies identify themselves on their first discovery request. The
//! declared identifier is hashed into a [`NodeHash`], which keys the
//! per-node snapshot table.

use std::fmt;
use std::hash::{Hash, Hasher};

use fnv::FnvHasher;

/// Hash-based node identifier for snapshot lookup.
///
/// `NodeHash` uses FNV-1a to turn a node identifier into a fixed-size key.
/// The same identifier always maps to the same hash, so the sync driver
/// and the ADS server agree on the key without sharing any state.
///
/// # Example
///
/// ```rust
/// use mesh_core::NodeHash;
///
/// let a = NodeHash::from_id("reviews");
/// let b = NodeHash::from_id("ratings");
///
/// assert_ne!(a, b);
/// assert_eq!(a, NodeHash::from_id("reviews"));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHash(u64);

impl NodeHash {
    /// Create a node hash from a node identifier.
    #[must_use]
    pub fn from_id(node_id: &str) -> Self {
        let mut hasher = FnvHasher::default();
        node_id.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Get the raw hash value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<&str> for NodeHash {
    fn from(node_id: &str) -> Self {
        Self::from_id(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_hash_deterministic() {
        let node1 = NodeHash::from_id("test-node");
        let node2 = NodeHash::from_id("test-node");
        assert_eq!(node1, node2);
        assert_eq!(node1.as_u64(), node2.as_u64());
    }

    #[test]
    fn test_different_nodes_different_hashes() {
        let node1 = NodeHash::from_id("node-1");
        let node2 = NodeHash::from_id("node-2");
        let node3 = NodeHash::from_id("1-node");
        assert_ne!(node1, node2);
        assert_ne!(node2, node3);
    }

    #[test]
    fn test_display() {
        let node = NodeHash::from_id("test");
        assert_eq!(format!("{node}").len(), 16);
    }

    #[test]
    fn test_from_str() {
        let node: NodeHash = "reviews".into();
        assert_eq!(node, NodeHash::from_id("reviews"));
    }
}
