//! Stream lifecycle hooks.
//!
//! The stream handler calls these synchronously, in order, from the task
//! serving the stream. Implementations must not block.

use std::fmt;

use mesh_types::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use tracing::{debug, info, warn};

use crate::stream::StreamContext;

/// Observer of ADS stream events.
///
/// Every method has an empty default, so implementations override only
/// what they need.
pub trait StreamCallbacks: Send + Sync + fmt::Debug + 'static {
    /// A stream was accepted.
    fn on_stream_open(&self, _ctx: &StreamContext) {}

    /// A request arrived on a stream whose node is known.
    fn on_stream_request(&self, _ctx: &StreamContext, _request: &DiscoveryRequest) {}

    /// A response is about to be sent.
    fn on_stream_response(&self, _ctx: &StreamContext, _response: &DiscoveryResponse) {}

    /// The client rejected a response.
    fn on_stream_nack(&self, _ctx: &StreamContext, _request: &DiscoveryRequest) {}

    /// The stream ended. Subscription state is gone after this call.
    fn on_stream_closed(&self, _ctx: &StreamContext, _reason: &str) {}
}

/// Logs stream events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCallbacks;

impl StreamCallbacks for TracingCallbacks {
    fn on_stream_open(&self, ctx: &StreamContext) {
        debug!(stream = %ctx.id(), "stream opened");
    }

    fn on_stream_request(&self, ctx: &StreamContext, request: &DiscoveryRequest) {
        let cluster = request.node.as_ref().map_or("", |n| n.cluster.as_str());
        info!(
            stream = %ctx.id(),
            node = ctx.node_id(),
            cluster,
            type_url = %request.type_url,
            resources = ?request.resource_names,
            version = %request.version_info,
            nonce = %request.response_nonce,
            "discovery request"
        );
    }

    fn on_stream_response(&self, ctx: &StreamContext, response: &DiscoveryResponse) {
        info!(
            stream = %ctx.id(),
            node = ctx.node_id(),
            type_url = %response.type_url,
            version = %response.version_info,
            resources = response.resources.len(),
            "discovery response"
        );
    }

    fn on_stream_nack(&self, ctx: &StreamContext, request: &DiscoveryRequest) {
        let message = request
            .error_detail
            .as_ref()
            .map_or("", |status| status.message.as_str());
        warn!(
            stream = %ctx.id(),
            node = ctx.node_id(),
            type_url = %request.type_url,
            version = %request.version_info,
            error = message,
            "client rejected configuration"
        );
    }

    fn on_stream_closed(&self, ctx: &StreamContext, reason: &str) {
        info!(
            stream = %ctx.id(),
            node = ctx.node_id(),
            duration = ?ctx.duration(),
            requests = ctx.request_count(),
            responses = ctx.response_count(),
            reason,
            "stream closed"
        );
    }
}
