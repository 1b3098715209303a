//! # mesh-server
//!
//! Aggregated Discovery Service server for the meshplane control plane.
//!
//! This crate serves the snapshots held in a [`mesh_cache::SnapshotCache`]
//! to Envoy proxies over one bidirectional gRPC stream per proxy:
//!
//! - [`DiscoveryServer`] - ADS plus gRPC health on one listener
//! - [`DiscoveryServerBuilder`] - Builder for configuring the server
//! - State-of-the-World protocol with ACK/NACK tracking per resource type
//! - [`StreamCallbacks`] - Hooks for stream lifecycle events
//! - [`ShutdownController`] - Graceful drain shared with the rest of the process
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mesh_cache::SnapshotCache;
//! use mesh_server::DiscoveryServer;
//!
//! # async fn run() -> mesh_core::Result<()> {
//! let cache = Arc::new(SnapshotCache::new());
//! let server = DiscoveryServer::builder().cache(cache).build()?;
//!
//! let shutdown = server.shutdown_controller().clone();
//! tokio::spawn(async move {
//!     let _ = mesh_server::wait_for_signal().await;
//!     shutdown.trigger();
//! });
//!
//! server.serve("[::]:18000".parse().unwrap()).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
pub mod callbacks;
mod config;
pub mod health;
pub mod metrics;
pub mod services;
pub mod shutdown;
mod sotw;
mod stream;
mod utils;


pub use builder::DiscoveryServerBuilder;
pub use callbacks::{StreamCallbacks, TracingCallbacks};
pub use config::{NodeKey, ServerConfig};
pub use health::HealthService;
pub use metrics::ServerMetrics;
pub use services::{AdsService, ServiceState};
pub use shutdown::{wait_for_signal, OperationGuard, ShutdownController, ShutdownSignal};
pub use sotw::{RequestKind, SotwState};
pub use stream::{NodeInfo, StreamContext, StreamId};
pub use utils::generate_nonce;

use std::net::SocketAddr;
use std::sync::Arc;

use mesh_cache::SnapshotCache;
use mesh_core::{MeshError, Result};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};

/// The discovery server.
///
/// Owns nothing but handles: the cache is shared with whoever publishes,
/// and the shutdown controller with whoever decides when to stop.
#[derive(Debug)]
pub struct DiscoveryServer {
    cache: Arc<SnapshotCache>,
    config: Arc<ServerConfig>,
    callbacks: Arc<dyn StreamCallbacks>,
    metrics: ServerMetrics,
    shutdown: ShutdownController,
}

impl DiscoveryServer {
    /// Create a new builder for configuring the server.
    pub fn builder() -> DiscoveryServerBuilder {
        DiscoveryServerBuilder::new()
    }

    /// Get a reference to the cache.
    #[inline]
    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Get the server configuration.
    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the metrics recorder.
    #[inline]
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Get the shutdown controller.
    #[inline]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// State shared by every stream.
    pub fn service_state(&self) -> ServiceState {
        ServiceState {
            cache: Arc::clone(&self.cache),
            config: Arc::clone(&self.config),
            callbacks: Arc::clone(&self.callbacks),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// The ADS service, for mounting on a router of your own.
    pub fn ads_service(&self) -> AdsService {
        AdsService::new(self.service_state())
    }

    /// Bind `addr` and serve until shutdown.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound or the transport fails.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MeshError::internal(format!("failed to bind {addr}"), e))?;
        self.serve_with_listener(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    ///
    /// Once the shutdown controller fires, health flips to NOT_SERVING,
    /// new connections are refused and open streams are closed. Streams
    /// still open after the grace period are cut.
    ///
    /// # Errors
    ///
    /// Fails if the transport fails.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().ok();

        let mut builder = Server::builder()
            .http2_keepalive_interval(self.config.keepalive_interval)
            .http2_keepalive_timeout(self.config.keepalive_timeout)
            .max_concurrent_streams(self.config.max_concurrent_streams);

        let (health, health_service) = if self.config.enable_health {
            let (health, service) = HealthService::new();
            health.set_serving().await;
            (Some(health), Some(service))
        } else {
            (None, None)
        };

        let router = builder
            .add_service(self.ads_service().into_server())
            .add_optional_service(health_service);

        let signal = self.shutdown.shutdown_signal();
        let drain = async move {
            signal.wait().await;
            if let Some(health) = &health {
                health.set_not_serving().await;
            }
            info!("draining discovery streams");
        };

        let grace_period = self.config.grace_period;
        let deadline = self.shutdown.shutdown_signal();
        let serving = router.serve_with_incoming_shutdown(TcpListenerStream::new(listener), drain);

        info!(addr = ?local, "discovery server listening");

        tokio::select! {
            result = serving => {
                result.map_err(|e| MeshError::internal("discovery server failed", e))?;
                info!("discovery server stopped");
                Ok(())
            }
            _ = async move {
                deadline.wait().await;
                tokio::time::sleep(grace_period).await;
            } => {
                warn!(grace_period = ?grace_period, "grace period elapsed, closing remaining streams");
                Ok(())
            }
        }
    }
}
