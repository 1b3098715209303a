//! Reconciliation of cluster services into the persisted canonical list.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use mesh_core::{CanonicalList, MeshError, Result};
use tracing::{debug, info, instrument, warn};

use crate::source::{LabelSelector, ServiceSource};
use crate::store::{store_key, ServiceStore};

/// Result of one successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The persisted list was written.
    Updated,
    /// The persisted list already matched byte for byte; nothing was written.
    Unchanged,
}

impl ReconcileOutcome {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Selects the services that belong to the mesh.
    pub selector: LabelSelector,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            selector: LabelSelector::mesh(),
        }
    }
}

/// Turns the services of a namespace into its persisted canonical list.
///
/// One reconciler should be the only writer of the store. Calls for
/// different namespaces are independent; calls for the same namespace
/// are serialized by the [`ReconcileQueue`](crate::ReconcileQueue) worker.
pub struct Reconciler {
    source: Arc<dyn ServiceSource>,
    store: Arc<dyn ServiceStore>,
    config: ReconcilerConfig,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler with the default mesh selector.
    pub fn new(source: Arc<dyn ServiceSource>, store: Arc<dyn ServiceStore>) -> Self {
        Self::with_config(source, store, ReconcilerConfig::default())
    }

    /// Create a reconciler with an explicit configuration.
    pub fn with_config(
        source: Arc<dyn ServiceSource>,
        store: Arc<dyn ServiceStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// The store this reconciler writes to.
    pub fn store(&self) -> &Arc<dyn ServiceStore> {
        &self.store
    }

    /// Build the canonical list for a namespace from its current services.
    ///
    /// Services without a cluster address or a usable first port are
    /// skipped. When two services share a name the first one after sorting
    /// is kept.
    pub async fn canonical_list(&self, namespace: &str) -> Result<CanonicalList> {
        let records = self.source.list(namespace, &self.config.selector).await?;

        let services = records
            .iter()
            .filter_map(|record| {
                let meta = record.to_service_meta();
                if meta.is_none() {
                    debug!(namespace, service = %record.name, "skipping service without address or port");
                }
                meta
            })
            .collect();

        let (list, duplicates) = CanonicalList::from_records(services);
        for name in duplicates {
            warn!(namespace, service = %name, "duplicate service name, keeping first");
        }
        Ok(list)
    }

    /// Reconcile one namespace.
    ///
    /// The list is written only when its serialized form differs from what
    /// the store holds. An update that finds nothing to update falls back
    /// to create.
    ///
    /// # Errors
    ///
    /// Source and store failures other than not-found on update are
    /// returned to the caller, which owns any retry.
    #[instrument(skip(self), fields(outcome = tracing::field::Empty))]
    pub async fn reconcile(&self, namespace: &str) -> Result<ReconcileOutcome> {
        let started = Instant::now();
        info!("reconciling");

        let result = self.reconcile_inner(namespace).await;

        let outcome = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "failed",
        };
        tracing::Span::current().record("outcome", outcome);
        counter!("meshplane_reconcile_total", "outcome" => outcome).increment(1);
        histogram!("meshplane_reconcile_duration_seconds").record(started.elapsed().as_secs_f64());

        result
    }

    async fn reconcile_inner(&self, namespace: &str) -> Result<ReconcileOutcome> {
        let list = self.canonical_list(namespace).await?;
        let data = list.to_bytes().map_err(|e| MeshError::Serialization {
            namespace: namespace.to_string(),
            source: Box::new(e),
        })?;

        let key = store_key(namespace);
        let changed = match self.store.get(&key).await? {
            Some(current) => current != data,
            None => true,
        };
        if !changed {
            info!("services meta unchanged, skip store update");
            return Ok(ReconcileOutcome::Unchanged);
        }

        match self.store.update(&key, data.clone()).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => self.store.create(&key, data).await?,
            Err(e) => return Err(e),
        }

        info!(services = list.len(), "updated service map");
        Ok(ReconcileOutcome::Updated)
    }
}
