//! Cluster service sources.
//!
//! A [`ServiceSource`] lists the service objects of one namespace that
//! match a label selector. The reconciler only needs name, cluster
//! address, ports and annotations, so [`ServiceRecord`] carries just that.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use mesh_core::{ConnectTimeout, MeshError, Result, ServiceMeta};
use serde::{Deserialize, Serialize};

/// Label key selecting mesh-enabled services.
pub const MESH_SELECTOR_KEY: &str = "meshed";

/// Label value selecting mesh-enabled services.
pub const MESH_SELECTOR_VALUE: &str = "enabled";

/// Annotation carrying a service's connect timeout.
pub const MESH_TIMEOUT_ANNOTATION: &str = "mesh-timeout";

/// One declared service port.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    /// Optional port name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Port number as declared; may be out of range in malformed input.
    pub port: i32,
}

/// A service object as listed from the cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Service name.
    pub name: String,
    /// Cluster address; empty for services without one.
    #[serde(default)]
    pub cluster_ip: String,
    /// Declared ports, in declaration order.
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    /// Object labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Object annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ServiceRecord {
    /// Create a record with a cluster address and a single port.
    pub fn new(name: impl Into<String>, cluster_ip: impl Into<String>, port: i32) -> Self {
        Self {
            name: name.into(),
            cluster_ip: cluster_ip.into(),
            ports: vec![ServicePort { name: None, port }],
            ..Default::default()
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add the mesh selector label.
    #[must_use]
    pub fn meshed(self) -> Self {
        self.with_label(MESH_SELECTOR_KEY, MESH_SELECTOR_VALUE)
    }

    /// Add an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Convert to the canonical record.
    ///
    /// Returns `None` for services without a cluster address, without
    /// ports, or whose first port is not a valid non-zero port. Only the
    /// first declared port is used.
    pub fn to_service_meta(&self) -> Option<ServiceMeta> {
        if self.cluster_ip.is_empty() {
            return None;
        }
        let port = self.ports.first()?.port;
        let port = u16::try_from(port).ok().filter(|p| *p != 0)?;

        let timeout = ConnectTimeout::from_annotation(
            self.annotations
                .get(MESH_TIMEOUT_ANNOTATION)
                .map(String::as_str),
        );

        Some(ServiceMeta::new(&self.name, &self.cluster_ip, port).with_timeout(timeout))
    }
}

/// Equality-based label selector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// A selector that matches every object.
    pub fn everything() -> Self {
        Self::default()
    }

    /// The `meshed=enabled` selector.
    pub fn mesh() -> Self {
        Self::everything().with(MESH_SELECTOR_KEY, MESH_SELECTOR_VALUE)
    }

    /// Require a label value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// Whether the labels satisfy every requirement.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Lists the services of a namespace.
#[async_trait]
pub trait ServiceSource: Send + Sync {
    /// List the services in `namespace` whose labels match `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Source`] when the source is unavailable.
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<ServiceRecord>>;
}

/// In-memory service source.
///
/// Contents are replaced per namespace; useful for embedding and tests.
#[derive(Debug, Default)]
pub struct StaticServiceSource {
    services: DashMap<String, Vec<ServiceRecord>>,
}

impl StaticServiceSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all services of a namespace.
    pub fn set_services(&self, namespace: impl Into<String>, services: Vec<ServiceRecord>) {
        self.services.insert(namespace.into(), services);
    }

    /// Insert or replace one service by name.
    pub fn upsert(&self, namespace: &str, service: ServiceRecord) {
        let mut entry = self.services.entry(namespace.to_string()).or_default();
        match entry.iter().position(|s| s.name == service.name) {
            Some(idx) => entry[idx] = service,
            None => entry.push(service),
        }
    }

    /// Remove one service by name.
    pub fn remove(&self, namespace: &str, name: &str) {
        if let Some(mut entry) = self.services.get_mut(namespace) {
            entry.retain(|s| s.name != name);
        }
    }
}

#[async_trait]
impl ServiceSource for StaticServiceSource {
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<ServiceRecord>> {
        Ok(self
            .services
            .get(namespace)
            .map(|services| {
                services
                    .iter()
                    .filter(|s| selector.matches(&s.labels))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Service source backed by a JSON file.
///
/// The file maps namespace names to service records and is re-read on
/// every call, so edits are picked up by the next reconcile:
///
/// ```json
/// {
///   "default": [
///     {
///       "name": "reviews",
///       "cluster_ip": "10.0.0.7",
///       "ports": [{ "port": 9080 }],
///       "labels": { "meshed": "enabled" },
///       "annotations": { "mesh-timeout": "2s" }
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileServiceSource {
    path: PathBuf,
}

impl FileServiceSource {
    /// Read services from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ServiceSource for FileServiceSource {
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<ServiceRecord>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            MeshError::source(namespace, format!("reading {}", self.path.display()), e)
        })?;
        let mut all: BTreeMap<String, Vec<ServiceRecord>> = serde_json::from_slice(&bytes)
            .map_err(|e| {
                MeshError::source(namespace, format!("parsing {}", self.path.display()), e)
            })?;

        Ok(all
            .remove(namespace)
            .unwrap_or_default()
            .into_iter()
            .filter(|s| selector.matches(&s.labels))
            .collect())
    }
}
