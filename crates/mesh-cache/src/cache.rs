//! Cache trait and SnapshotCache implementation.
//!
//! The cache stores one snapshot per node hash. Publishing swaps an
//! `Arc<Snapshot>` into a `DashMap` slot, so readers never wait on a
//! publisher for longer than a shard lock around a pointer swap.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mesh_core::{NodeHash, ResourceVersion, Result, VersionClock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::snapshot::{ResourceSet, Snapshot};
use crate::stats::CacheStats;
use crate::watch::{Watch, WatchManager};

/// Trait for snapshot caches.
pub trait Cache: Send + Sync {
    /// Get the current snapshot for a node, or `None` if nothing was
    /// ever published for it.
    fn get_snapshot(&self, node: NodeHash) -> Option<Arc<Snapshot>>;

    /// Publish a resource set for a node under a fresh version.
    ///
    /// All resource types become visible together. Watches for the node
    /// are notified.
    fn publish(&self, node: NodeHash, resources: &ResourceSet) -> Result<ResourceVersion>;

    /// Remove the snapshot for a node.
    fn clear_snapshot(&self, node: NodeHash);

    /// Get the number of cached snapshots.
    fn snapshot_count(&self) -> usize;
}

/// Concurrent per-node snapshot cache.
///
/// ## Thread Safety
///
/// All operations are thread-safe. `DashMap` shards the table, and every
/// `DashMap` reference is dropped before watches are notified, so no lock
/// is ever held across a channel send.
///
/// ## Ordering
///
/// A slot only ever moves to a newer version. When two publishes for the
/// same node race, the one minted later wins even if it lands first.
#[derive(Debug)]
pub struct SnapshotCache {
    snapshots: DashMap<NodeHash, Arc<Snapshot>>,
    watches: WatchManager,
    stats: CacheStats,
    clock: VersionClock,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    /// Create a new cache with default settings.
    pub fn new() -> Self {
        CacheBuilder::new().build()
    }

    /// Create a new cache with a specific initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        CacheBuilder::new().capacity(capacity).build()
    }

    /// Get the watch manager.
    #[inline]
    pub fn watches(&self) -> &WatchManager {
        &self.watches
    }

    /// Get cache statistics.
    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Create a watch for a node.
    ///
    /// The watch receives every snapshot published for the node from now
    /// on, plus heartbeat re-deliveries. Callers that need the current
    /// snapshot should create the watch first and then call
    /// [`Cache::get_snapshot`], so no publish can slip in between.
    #[inline]
    pub fn create_watch(&self, node: NodeHash) -> Watch {
        self.watches.create_watch(node)
    }

    /// Cancel a watch.
    #[inline]
    pub fn cancel_watch(&self, watch: &Watch) {
        self.watches.cancel_watch(watch)
    }

    /// Publish one snapshot, with one version, to several nodes.
    ///
    /// The resource set is encoded once and shared by all nodes.
    pub fn publish_many<I>(&self, nodes: I, resources: &ResourceSet) -> Result<ResourceVersion>
    where
        I: IntoIterator<Item = NodeHash>,
    {
        let snapshot = Arc::new(Snapshot::new(self.clock.next(), resources)?);
        for node in nodes {
            self.install(node, &snapshot);
        }
        Ok(snapshot.version().clone())
    }

    fn install(&self, node: NodeHash, snapshot: &Arc<Snapshot>) {
        let installed = match self.snapshots.entry(node) {
            Entry::Occupied(mut slot) => {
                if snapshot.version().is_newer_than(slot.get().version()) {
                    slot.insert(Arc::clone(snapshot));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(snapshot));
                true
            }
        };

        if !installed {
            self.stats.record_stale_publish();
            debug!(node = %node, version = %snapshot.version(), "discarded stale publish");
            return;
        }

        self.stats.record_publish();
        debug!(
            node = %node,
            version = %snapshot.version(),
            resources = snapshot.total_resources(),
            "published snapshot"
        );

        let outcome = self.watches.notify(node, snapshot);
        self.stats
            .record_notifications(outcome.delivered, outcome.dropped);
    }

    /// Re-deliver every node's current snapshot to its watches.
    ///
    /// Versions are not bumped. Returns the number of nodes signalled.
    pub fn heartbeat(&self) -> usize {
        let current: Vec<(NodeHash, Arc<Snapshot>)> = self
            .snapshots
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();

        for (node, snapshot) in &current {
            let outcome = self.watches.notify(*node, snapshot);
            self.stats
                .record_notifications(outcome.delivered, outcome.dropped);
        }
        self.stats.record_heartbeat();
        trace!(nodes = current.len(), "cache heartbeat");

        current.len()
    }

    /// Run [`SnapshotCache::heartbeat`] on a fixed interval until
    /// `shutdown` resolves.
    pub fn spawn_heartbeat<F>(self: &Arc<Self>, interval: Duration, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tokio::pin!(shutdown);

            info!(interval_ms = interval.as_millis() as u64, "cache heartbeat started");
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => {
                        cache.heartbeat();
                    }
                }
            }
            info!("cache heartbeat stopped");
        })
    }

    /// Get all node hashes in the cache.
    pub fn nodes(&self) -> Vec<NodeHash> {
        self.snapshots.iter().map(|r| *r.key()).collect()
    }

    /// Check if a snapshot exists for a node.
    pub fn has_snapshot(&self, node: NodeHash) -> bool {
        self.snapshots.contains_key(&node)
    }
}

impl Cache for SnapshotCache {
    fn get_snapshot(&self, node: NodeHash) -> Option<Arc<Snapshot>> {
        // Clone the Arc and drop the shard guard immediately.
        let result = self.snapshots.get(&node).map(|r| Arc::clone(&*r));

        if result.is_some() {
            self.stats.record_hit();
            trace!(node = %node, "cache hit");
        } else {
            self.stats.record_miss();
            trace!(node = %node, "cache miss");
        }

        result
    }

    fn publish(&self, node: NodeHash, resources: &ResourceSet) -> Result<ResourceVersion> {
        self.publish_many(std::iter::once(node), resources)
    }

    fn clear_snapshot(&self, node: NodeHash) {
        if self.snapshots.remove(&node).is_some() {
            self.stats.record_clear();
            debug!(node = %node, "cleared snapshot");
        }
    }

    fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

/// Builder for creating a configured cache.
#[derive(Debug, Default)]
pub struct CacheBuilder {
    capacity: Option<usize>,
    watch_buffer_size: Option<usize>,
}

impl CacheBuilder {
    /// Create a new cache builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the watch channel buffer size.
    pub fn watch_buffer_size(mut self, size: usize) -> Self {
        self.watch_buffer_size = Some(size);
        self
    }

    /// Build the cache.
    pub fn build(self) -> SnapshotCache {
        SnapshotCache {
            snapshots: DashMap::with_capacity(self.capacity.unwrap_or(64)),
            watches: WatchManager::with_buffer_size(self.watch_buffer_size.unwrap_or(16)),
            stats: CacheStats::new(),
            clock: VersionClock::new(),
        }
    }
}
