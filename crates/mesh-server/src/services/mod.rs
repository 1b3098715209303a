//! gRPC service implementations.
//!
//! Only the Aggregated Discovery Service is served. Its delta RPC is not
//! part of the generated service, so tonic answers it with UNIMPLEMENTED.

pub mod ads;

use std::sync::Arc;

use mesh_cache::SnapshotCache;

use crate::callbacks::StreamCallbacks;
use crate::config::ServerConfig;
use crate::metrics::ServerMetrics;
use crate::shutdown::ShutdownController;

pub use ads::AdsService;
pub use mesh_types::envoy::service::discovery::v3::aggregated_discovery_service_server::{
    AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
};

/// State shared by every stream of one server.
#[derive(Debug, Clone)]
pub struct ServiceState {
    /// Snapshot cache streams read from.
    pub cache: Arc<SnapshotCache>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Stream lifecycle hooks.
    pub callbacks: Arc<dyn StreamCallbacks>,
    /// Metrics recorder.
    pub metrics: ServerMetrics,
    /// Process-wide shutdown signal.
    pub shutdown: ShutdownController,
}
