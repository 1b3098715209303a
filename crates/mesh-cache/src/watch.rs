//! Watch system for snapshot notifications.
//!
//! The watch system provides:
//! - Unique watch identifiers ([`WatchId`])
//! - Watch subscriptions ([`Watch`]) for receiving snapshots
//! - Watch management ([`WatchManager`]) for fanning out to subscribers
//!
//! Notifications never block the publisher: each watch has a bounded
//! channel and a full channel drops the notification. The cache heartbeat
//! re-delivers the current snapshot, so a dropped notification is only
//! delayed, never lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mesh_core::NodeHash;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::Snapshot;

/// Unique identifier for a watch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value of this watch ID.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// A subscription to snapshot notifications for one node.
#[derive(Debug)]
pub struct Watch {
    id: WatchId,
    node_hash: NodeHash,
    receiver: mpsc::Receiver<Arc<Snapshot>>,
}

impl Watch {
    /// Get the unique identifier for this watch.
    #[inline]
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Get the node hash this watch is subscribed to.
    #[inline]
    pub fn node_hash(&self) -> NodeHash {
        self.node_hash
    }

    /// Receive the next notification.
    ///
    /// Returns `None` if the watch has been cancelled.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.recv().await
    }

    /// Receive a notification without waiting.
    pub fn try_recv(&mut self) -> Result<Arc<Snapshot>, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

#[derive(Debug, Clone)]
struct WatchSender {
    id: WatchId,
    sender: mpsc::Sender<Arc<Snapshot>>,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyOutcome {
    /// Watches that received the snapshot.
    pub delivered: u64,
    /// Watches whose channel was full.
    pub dropped: u64,
}

/// Manager for watch subscriptions.
///
/// Senders are cloned out of the map before sending, so no map lock is
/// held while channels are touched.
#[derive(Debug)]
pub struct WatchManager {
    watches: DashMap<NodeHash, Vec<WatchSender>>,
    channel_buffer: usize,
}

impl Default for WatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchManager {
    /// Create a new watch manager with default settings.
    pub fn new() -> Self {
        Self::with_buffer_size(16)
    }

    /// Create a new watch manager with a custom channel buffer size.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            watches: DashMap::new(),
            channel_buffer: buffer_size.max(1),
        }
    }

    /// Create a new watch for a node.
    pub fn create_watch(&self, node_hash: NodeHash) -> Watch {
        let id = WatchId::next();
        let (sender, receiver) = mpsc::channel(self.channel_buffer);

        self.watches
            .entry(node_hash)
            .or_default()
            .push(WatchSender { id, sender });

        debug!(watch_id = %id, node = %node_hash, "created watch");

        Watch {
            id,
            node_hash,
            receiver,
        }
    }

    /// Cancel a watch subscription.
    pub fn cancel_watch(&self, watch: &Watch) {
        let now_empty = match self.watches.get_mut(&watch.node_hash) {
            Some(mut senders) => {
                senders.retain(|s| s.id != watch.id);
                senders.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.watches.remove_if(&watch.node_hash, |_, senders| senders.is_empty());
        }
        debug!(watch_id = %watch.id, node = %watch.node_hash, "cancelled watch");
    }

    /// Send a snapshot to every watch of a node.
    ///
    /// Closed watches are removed.
    pub fn notify(&self, node_hash: NodeHash, snapshot: &Arc<Snapshot>) -> NotifyOutcome {
        let senders: Vec<WatchSender> = match self.watches.get(&node_hash) {
            Some(senders) => senders.clone(),
            None => return NotifyOutcome::default(),
        };

        let mut outcome = NotifyOutcome::default();
        let mut closed = Vec::new();
        for watch in &senders {
            match watch.sender.try_send(Arc::clone(snapshot)) {
                Ok(()) => outcome.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(watch_id = %watch.id, "watch channel full, dropping notification");
                    outcome.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(watch.id),
            }
        }

        if !closed.is_empty() {
            if let Some(mut senders) = self.watches.get_mut(&node_hash) {
                senders.retain(|s| !closed.contains(&s.id));
            }
            self.watches.remove_if(&node_hash, |_, senders| senders.is_empty());
            debug!(node = %node_hash, count = closed.len(), "removed closed watches");
        }

        outcome
    }

    /// Get the number of active watches for a node.
    pub fn watch_count(&self, node_hash: NodeHash) -> usize {
        self.watches.get(&node_hash).map_or(0, |v| v.len())
    }

    /// Get the total number of active watches across all nodes.
    pub fn total_watch_count(&self) -> usize {
        self.watches.iter().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceSet;
    use mesh_core::ResourceVersion;

    fn snapshot(seq: u64) -> Arc<Snapshot> {
        Arc::new(Snapshot::new(ResourceVersion::from_sequence(seq), &ResourceSet::new()).unwrap())
    }

    #[test]
    fn watch_id_unique() {
        let id1 = WatchId::next();
        let id2 = WatchId::next();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn watch_manager_create_and_notify() {
        let manager = WatchManager::new();
        let node = NodeHash::from_id("test-node");

        let mut watch = manager.create_watch(node);
        assert_eq!(manager.watch_count(node), 1);

        let outcome = manager.notify(node, &snapshot(1));
        assert_eq!(outcome.delivered, 1);

        let received = watch.recv().await.unwrap();
        assert_eq!(received.version().as_str(), "v1");
    }

    #[test]
    fn watch_manager_cancel() {
        let manager = WatchManager::new();
        let node = NodeHash::from_id("test-node");

        let watch = manager.create_watch(node);
        assert_eq!(manager.watch_count(node), 1);

        manager.cancel_watch(&watch);
        assert_eq!(manager.watch_count(node), 0);
        assert_eq!(manager.total_watch_count(), 0);
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let manager = WatchManager::with_buffer_size(1);
        let node = NodeHash::from_id("slow");
        let mut watch = manager.create_watch(node);

        assert_eq!(manager.notify(node, &snapshot(1)).delivered, 1);
        assert_eq!(manager.notify(node, &snapshot(2)).dropped, 1);

        assert_eq!(watch.try_recv().unwrap().version().sequence(), 1);
        assert!(watch.try_recv().is_err());
    }

    #[test]
    fn dropped_watch_is_pruned() {
        let manager = WatchManager::new();
        let node = NodeHash::from_id("gone");
        drop(manager.create_watch(node));

        let outcome = manager.notify(node, &snapshot(1));
        assert_eq!(outcome, NotifyOutcome::default());
        assert_eq!(manager.watch_count(node), 0);
    }
}
