//! gRPC health checking (`grpc.health.v1.Health`).
//!
//! The ADS service and the overall server (empty service name) report
//! SERVING while the server runs and flip to NOT_SERVING as soon as
//! shutdown starts, so load balancers stop routing new proxies here
//! while open streams drain.

use std::sync::Arc;

use tokio::sync::Mutex;
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;

/// Service names reported by the health service.
pub const HEALTH_SERVICE_NAMES: &[&str] = &[
    "",
    "envoy.service.discovery.v3.AggregatedDiscoveryService",
];

/// Health status handle for the discovery server.
#[derive(Clone)]
pub struct HealthService {
    reporter: Arc<Mutex<HealthReporter>>,
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService").finish()
    }
}

impl HealthService {
    /// Create the handle together with the tonic service to mount.
    pub fn new() -> (
        Self,
        tonic_health::pb::health_server::HealthServer<impl tonic_health::pb::health_server::Health>,
    ) {
        let (reporter, service) = tonic_health::server::health_reporter();
        let wrapper = Self {
            reporter: Arc::new(Mutex::new(reporter)),
        };
        (wrapper, service)
    }

    /// Report every service as serving.
    pub async fn set_serving(&self) {
        self.set_all(ServingStatus::Serving).await;
    }

    /// Report every service as not serving.
    pub async fn set_not_serving(&self) {
        self.set_all(ServingStatus::NotServing).await;
    }

    async fn set_all(&self, status: ServingStatus) {
        let mut reporter = self.reporter.lock().await;
        for service in HEALTH_SERVICE_NAMES {
            reporter.set_service_status(service, status).await;
        }
    }
}
