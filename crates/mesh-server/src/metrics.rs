//! Metrics for the discovery server.
//!
//! Recorded through the `metrics` facade; the binary decides whether an
//! exporter is installed. Without one every call is a no-op.
//!
//! - `meshplane_discovery_requests_total{type_url}`
//! - `meshplane_discovery_responses_total{type_url}`
//! - `meshplane_discovery_acks_total{type_url}` / `meshplane_discovery_nacks_total{type_url}`
//! - `meshplane_active_streams`, `meshplane_streams_opened_total`,
//!   `meshplane_stream_duration_seconds`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metrics recorder shared by every stream of one server.
#[derive(Debug, Clone, Default)]
pub struct ServerMetrics {
    active_streams: Arc<AtomicU64>,
}

impl ServerMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming discovery request.
    pub fn record_request(&self, type_url: &str) {
        counter!("meshplane_discovery_requests_total", "type_url" => type_url.to_string())
            .increment(1);
    }

    /// Record a response sent.
    pub fn record_response(&self, type_url: &str, resources: usize) {
        counter!("meshplane_discovery_responses_total", "type_url" => type_url.to_string())
            .increment(1);
        histogram!("meshplane_discovery_response_resources", "type_url" => type_url.to_string())
            .record(resources as f64);
    }

    /// Record an ACK.
    pub fn record_ack(&self, type_url: &str) {
        counter!("meshplane_discovery_acks_total", "type_url" => type_url.to_string()).increment(1);
    }

    /// Record a NACK.
    pub fn record_nack(&self, type_url: &str) {
        counter!("meshplane_discovery_nacks_total", "type_url" => type_url.to_string())
            .increment(1);
    }

    /// Record a stream opened.
    pub fn stream_opened(&self) {
        let count = self.active_streams.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("meshplane_streams_opened_total").increment(1);
        gauge!("meshplane_active_streams").set(count as f64);
    }

    /// Record a stream closed.
    pub fn stream_closed(&self, duration: Duration) {
        let count = self.active_streams.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        gauge!("meshplane_active_streams").set(count as f64);
        histogram!("meshplane_stream_duration_seconds").record(duration.as_secs_f64());
    }

    /// Get the current number of active streams.
    pub fn active_streams(&self) -> u64 {
        self.active_streams.load(Ordering::Relaxed)
    }
}

/// Counts a stream as active for as long as it lives.
#[derive(Debug)]
pub struct StreamTracker {
    start: Instant,
    metrics: ServerMetrics,
}

impl StreamTracker {
    /// Record a stream opened; the close is recorded on drop.
    pub fn new(metrics: ServerMetrics) -> Self {
        metrics.stream_opened();
        Self {
            start: Instant::now(),
            metrics,
        }
    }
}

impl Drop for StreamTracker {
    fn drop(&mut self) {
        self.metrics.stream_closed(self.start.elapsed());
    }
}
