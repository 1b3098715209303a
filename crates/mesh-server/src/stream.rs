//! Stream context and identification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use mesh_core::NodeHash;

/// Unique identifier for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    /// Generate a new unique stream ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Identity a proxy declared on its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Declared node id.
    pub id: String,
    /// Declared node cluster.
    pub cluster: String,
    /// Snapshot cache key derived from the id or cluster.
    pub hash: NodeHash,
}

/// Context for an active ADS stream.
///
/// Owned by the task serving the stream and handed to
/// [`StreamCallbacks`](crate::StreamCallbacks) by reference.
#[derive(Debug)]
pub struct StreamContext {
    id: StreamId,
    node: Option<NodeInfo>,
    created_at: Instant,
    requests: u64,
    responses: u64,
}

impl StreamContext {
    /// Create a new stream context.
    pub fn new() -> Self {
        Self {
            id: StreamId::new(),
            node: None,
            created_at: Instant::now(),
            requests: 0,
            responses: 0,
        }
    }

    /// Get the stream ID.
    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Node identity, once the first request carrying one arrived.
    #[inline]
    pub fn node(&self) -> Option<&NodeInfo> {
        self.node.as_ref()
    }

    /// Get the node hash if known.
    #[inline]
    pub fn node_hash(&self) -> Option<NodeHash> {
        self.node.as_ref().map(|n| n.hash)
    }

    /// Get the node id if known, or an empty string.
    #[inline]
    pub fn node_id(&self) -> &str {
        self.node.as_ref().map_or("", |n| n.id.as_str())
    }

    pub(crate) fn set_node(&mut self, node: NodeInfo) {
        self.node = Some(node);
    }

    /// Time since the stream opened.
    #[inline]
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn record_request(&mut self) {
        self.requests += 1;
    }

    pub(crate) fn record_response(&mut self) {
        self.responses += 1;
    }

    /// Requests received so far.
    #[inline]
    pub fn request_count(&self) -> u64 {
        self.requests
    }

    /// Responses sent so far.
    #[inline]
    pub fn response_count(&self) -> u64 {
        self.responses
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_unique() {
        let id1 = StreamId::new();
        let id2 = StreamId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("stream-"));
    }

    #[test]
    fn stream_context_counting() {
        let mut ctx = StreamContext::new();
        ctx.record_request();
        ctx.record_request();
        ctx.record_response();

        assert_eq!(ctx.request_count(), 2);
        assert_eq!(ctx.response_count(), 1);
    }

    #[test]
    fn stream_context_node() {
        let mut ctx = StreamContext::new();
        assert!(ctx.node_hash().is_none());
        assert_eq!(ctx.node_id(), "");

        let hash = NodeHash::from_id("reviews");
        ctx.set_node(NodeInfo {
            id: "reviews-7f9c".to_string(),
            cluster: "reviews".to_string(),
            hash,
        });

        assert_eq!(ctx.node_id(), "reviews-7f9c");
        assert_eq!(ctx.node_hash(), Some(hash));
    }
}
