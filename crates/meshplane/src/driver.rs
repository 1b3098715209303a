//! Sync driver: persisted service lists to published snapshots.
//!
//! On every tick, or when woken after a reconcile wrote something new, the
//! driver reads each namespace's canonical list from the store, works out
//! which namespaces feed each node, and publishes one merged snapshot per
//! node. A service's node is fed by every namespace that lists the service;
//! extra nodes are fed by all of them. A namespace that fails to load is
//! logged and left out; the rest still publish.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mesh_cache::SnapshotCache;
use mesh_core::{CanonicalList, NodeHash, Result};
use mesh_registry::{load_canonical_list, ServiceStore};
use metrics::counter;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::translator::translate;

/// Sync driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Namespaces synced on every cycle.
    pub namespaces: Vec<String>,
    /// Interval between cycles.
    pub interval: Duration,
    /// Node ids fed by every namespace, in addition to each service's own name.
    pub extra_nodes: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            namespaces: vec!["default".to_string()],
            interval: Duration::from_secs(5),
            extra_nodes: Vec::new(),
        }
    }
}

/// Summary of one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Namespaces loaded and published.
    pub published: usize,
    /// Namespaces with nothing persisted.
    pub skipped: usize,
    /// Namespaces that failed to load.
    pub failed: usize,
    /// Nodes that received a snapshot.
    pub nodes: usize,
}

/// Namespaces feeding a group of nodes, as indexes into the loaded lists.
type Sources = BTreeSet<usize>;

/// Periodically publishes persisted service lists into the cache.
pub struct SyncDriver {
    store: Arc<dyn ServiceStore>,
    cache: Arc<SnapshotCache>,
    config: DriverConfig,
    wake: Arc<Notify>,
}

impl std::fmt::Debug for SyncDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncDriver {
    /// Create a driver.
    pub fn new(
        store: Arc<dyn ServiceStore>,
        cache: Arc<SnapshotCache>,
        config: DriverConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle that triggers an immediate cycle when notified.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Get the configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    #[instrument(skip(self))]
    async fn load(&self, namespace: &str) -> Result<Option<CanonicalList>> {
        let list = load_canonical_list(self.store.as_ref(), namespace).await?;
        if list.is_none() {
            debug!("no service list persisted yet");
        }
        Ok(list)
    }

    /// Sync every configured namespace once.
    ///
    /// Each node gets exactly one snapshot per cycle. While any namespace
    /// fails to load, extra nodes keep their previous snapshot instead of
    /// losing that namespace's services.
    pub async fn sync_once(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let mut loaded: Vec<(&str, CanonicalList)> = Vec::new();
        for namespace in &self.config.namespaces {
            match self.load(namespace).await {
                Ok(Some(list)) => loaded.push((namespace.as_str(), list)),
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    counter!("meshplane_sync_failures_total", "namespace" => namespace.clone())
                        .increment(1);
                    error!(namespace = %namespace, error = %e, "sync failed");
                }
            }
        }
        report.published = loaded.len();

        let extra_nodes: &[String] = if report.failed == 0 {
            &self.config.extra_nodes
        } else {
            if !self.config.extra_nodes.is_empty() {
                warn!(
                    extra_nodes = ?self.config.extra_nodes,
                    "a namespace failed, extra nodes keep their previous snapshot"
                );
            }
            &[]
        };

        for (sources, nodes) in node_targets(&loaded, extra_nodes) {
            let namespaces: Vec<&str> = sources.iter().map(|&slot| loaded[slot].0).collect();
            let records = sources
                .iter()
                .flat_map(|&slot| loaded[slot].1.iter().cloned())
                .collect();
            let (services, dropped) = CanonicalList::from_records(records);
            if !dropped.is_empty() {
                warn!(
                    namespaces = ?namespaces,
                    dropped = ?dropped,
                    "service listed by more than one namespace, keeping the first"
                );
            }

            let resources = translate(&services);
            match self
                .cache
                .publish_many(nodes.iter().copied().map(NodeHash::from_id), &resources)
            {
                Ok(version) => {
                    report.nodes += nodes.len();
                    debug!(
                        version = %version,
                        namespaces = ?namespaces,
                        services = services.len(),
                        nodes = nodes.len(),
                        "published service snapshot"
                    );
                }
                Err(e) => {
                    counter!("meshplane_publish_failures_total").increment(1);
                    error!(namespaces = ?namespaces, error = %e, "publish failed");
                }
            }
        }

        counter!("meshplane_sync_cycles_total").increment(1);
        report
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// A cycle in progress always finishes before shutdown is observed.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            namespaces = ?self.config.namespaces,
            interval = ?self.config.interval,
            "sync driver started"
        );
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => debug!("sync tick"),
                _ = self.wake.notified() => debug!("sync woken by registry update"),
            }
            self.sync_once().await;
        }
        info!("sync driver stopped");
    }
}

/// Group node ids by the set of loaded namespaces that feed them.
fn node_targets<'a>(
    loaded: &'a [(&'a str, CanonicalList)],
    extra_nodes: &'a [String],
) -> BTreeMap<Sources, Vec<&'a str>> {
    let mut fed_by: BTreeMap<&str, Sources> = BTreeMap::new();
    for (slot, (_, services)) in loaded.iter().enumerate() {
        for service in services {
            fed_by.entry(service.name.as_str()).or_default().insert(slot);
        }
    }
    if !loaded.is_empty() {
        for node in extra_nodes {
            fed_by.entry(node.as_str()).or_default().extend(0..loaded.len());
        }
    }

    let mut groups: BTreeMap<Sources, Vec<&str>> = BTreeMap::new();
    for (node, sources) in fed_by {
        groups.entry(sources).or_default().push(node);
    }
    groups
}
