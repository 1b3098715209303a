//! Server builder for configuring and creating the discovery server.

use std::sync::Arc;
use std::time::Duration;

use mesh_cache::SnapshotCache;
use mesh_core::{MeshError, Result};

use crate::callbacks::{StreamCallbacks, TracingCallbacks};
use crate::config::{NodeKey, ServerConfig};
use crate::metrics::ServerMetrics;
use crate::shutdown::ShutdownController;
use crate::DiscoveryServer;

/// Builder for creating a [`DiscoveryServer`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use mesh_cache::SnapshotCache;
/// use mesh_server::{DiscoveryServerBuilder, NodeKey};
///
/// let server = DiscoveryServerBuilder::new()
///     .cache(Arc::new(SnapshotCache::new()))
///     .node_key(NodeKey::Cluster)
///     .max_concurrent_streams(200)
///     .build()?;
///
/// assert_eq!(server.config().node_key, NodeKey::Cluster);
/// # Ok::<(), mesh_core::MeshError>(())
/// ```
#[derive(Debug, Default)]
pub struct DiscoveryServerBuilder {
    cache: Option<Arc<SnapshotCache>>,
    callbacks: Option<Arc<dyn StreamCallbacks>>,
    shutdown: Option<ShutdownController>,
    config: ServerConfig,
}

impl DiscoveryServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache to serve from.
    ///
    /// This is required.
    pub fn cache(mut self, cache: Arc<SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the stream callbacks. Defaults to [`TracingCallbacks`].
    pub fn callbacks(mut self, callbacks: Arc<dyn StreamCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Share a shutdown controller with the rest of the process.
    pub fn shutdown_controller(mut self, shutdown: ShutdownController) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the identifier sent on every response.
    pub fn control_plane_id(mut self, id: impl Into<String>) -> Self {
        self.config.control_plane_id = id.into();
        self
    }

    /// Set which node field keys the cache.
    pub fn node_key(mut self, key: NodeKey) -> Self {
        self.config.node_key = key;
        self
    }

    /// Set the per-stream response buffer.
    pub fn response_buffer_size(mut self, size: usize) -> Self {
        self.config.response_buffer_size = size;
        self
    }

    /// Set maximum concurrent streams per connection.
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.config.max_concurrent_streams = Some(max);
        self
    }

    /// Set keepalive interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = Some(interval);
        self
    }

    /// Set keepalive timeout.
    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keepalive_timeout = Some(timeout);
        self
    }

    /// Set how long open streams may drain on shutdown.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config.grace_period = grace;
        self
    }

    /// Disable the gRPC health service.
    pub fn disable_health(mut self) -> Self {
        self.config.enable_health = false;
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No cache was provided
    /// - The response buffer size is zero
    pub fn build(self) -> Result<DiscoveryServer> {
        let cache = self
            .cache
            .ok_or_else(|| MeshError::Configuration("cache is required".into()))?;

        if self.config.response_buffer_size == 0 {
            return Err(MeshError::Configuration(
                "response buffer size must be at least 1".into(),
            ));
        }

        Ok(DiscoveryServer {
            cache,
            config: Arc::new(self.config),
            callbacks: self
                .callbacks
                .unwrap_or_else(|| Arc::new(TracingCallbacks)),
            metrics: ServerMetrics::new(),
            shutdown: self.shutdown.unwrap_or_default(),
        })
    }
}
