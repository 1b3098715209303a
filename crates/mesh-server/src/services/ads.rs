//! Aggregated Discovery Service (ADS) implementation.
//!
//! Each accepted stream is served by one [`StreamHandler`] task. The task
//! waits on whichever comes first: a request from the client, a snapshot
//! notification for the client's node, or shutdown. Responses go through
//! a bounded channel, so a slow client only ever stalls its own task.

use std::sync::Arc;

use futures::Stream;
use mesh_cache::{Cache, Snapshot, Watch};
use mesh_core::{MeshError, NodeHash};
use mesh_types::envoy::config::core::v3::ControlPlane;
use mesh_types::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use super::{AggregatedDiscoveryService, AggregatedDiscoveryServiceServer, ServiceState};
use crate::metrics::StreamTracker;
use crate::shutdown::OperationGuard;
use crate::sotw::{RequestKind, SotwState};
use crate::stream::{NodeInfo, StreamContext};

/// Response stream type for ADS.
pub type AdsResponseStream = ReceiverStream<Result<DiscoveryResponse, Status>>;

/// Aggregated Discovery Service.
#[derive(Debug, Clone)]
pub struct AdsService {
    state: ServiceState,
}

impl AdsService {
    /// Create a new ADS service.
    pub fn new(state: ServiceState) -> Self {
        Self { state }
    }

    /// Wrap into the generated tonic server.
    pub fn into_server(self) -> AggregatedDiscoveryServiceServer<Self> {
        AggregatedDiscoveryServiceServer::new(self)
    }

    /// Serve one stream of requests, returning the response stream.
    ///
    /// The stream is handled on its own task until the client goes away
    /// or shutdown starts.
    pub fn open_stream<S>(&self, requests: S) -> Result<AdsResponseStream, Status>
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + 'static,
    {
        if self.state.shutdown.is_shutdown() {
            return Err(MeshError::Shutdown.into());
        }

        let (tx, rx) = mpsc::channel(self.state.config.response_buffer_size.max(1));
        let handler = StreamHandler::new(self.state.clone(), tx);
        tokio::spawn(handler.run(requests));
        Ok(ReceiverStream::new(rx))
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for AdsService {
    type StreamAggregatedResourcesStream = AdsResponseStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        let remote = request.remote_addr();
        let stream = self.open_stream(request.into_inner())?;
        debug!(remote = ?remote, "accepted ADS stream");
        Ok(Response::new(stream))
    }
}

type Closed = &'static str;

/// Per-stream protocol driver.
pub(crate) struct StreamHandler {
    state: ServiceState,
    ctx: StreamContext,
    sotw: SotwState,
    watch: Option<Watch>,
    control_plane: Option<ControlPlane>,
    tx: mpsc::Sender<Result<DiscoveryResponse, Status>>,
    _tracker: StreamTracker,
    _operation: OperationGuard,
}

impl StreamHandler {
    pub(crate) fn new(
        state: ServiceState,
        tx: mpsc::Sender<Result<DiscoveryResponse, Status>>,
    ) -> Self {
        let control_plane = (!state.config.control_plane_id.is_empty()).then(|| ControlPlane {
            identifier: state.config.control_plane_id.clone(),
        });
        Self {
            _tracker: StreamTracker::new(state.metrics.clone()),
            _operation: state.shutdown.register_operation(),
            ctx: StreamContext::new(),
            sotw: SotwState::new(),
            watch: None,
            control_plane,
            tx,
            state,
        }
    }

    pub(crate) async fn run<S>(mut self, requests: S)
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Send,
    {
        tokio::pin!(requests);
        let shutdown = self.state.shutdown.shutdown_signal().wait();
        tokio::pin!(shutdown);

        self.state.callbacks.on_stream_open(&self.ctx);

        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => break "server shutting down",
                next = requests.next() => match next {
                    Some(Ok(request)) => {
                        if let Err(reason) = self.on_request(request).await {
                            break reason;
                        }
                    }
                    Some(Err(status)) => {
                        debug!(stream = %self.ctx.id(), status = %status, "stream error");
                        break "stream error";
                    }
                    None => break "client closed stream",
                },
                snapshot = next_snapshot(&mut self.watch) => {
                    if let Err(reason) = self.on_snapshot(&snapshot).await {
                        break reason;
                    }
                }
            }
        };

        if let Some(watch) = self.watch.take() {
            self.state.cache.cancel_watch(&watch);
        }
        self.state.callbacks.on_stream_closed(&self.ctx, reason);
    }

    async fn on_request(&mut self, request: DiscoveryRequest) -> Result<(), Closed> {
        self.ctx.record_request();
        self.state.metrics.record_request(&request.type_url);

        let Some(node) = self.identify(&request) else {
            warn!(stream = %self.ctx.id(), "request before node identity is known, ignoring");
            return Ok(());
        };
        if request.type_url.is_empty() {
            warn!(stream = %self.ctx.id(), "request without type_url, ignoring");
            return Ok(());
        }

        self.state.callbacks.on_stream_request(&self.ctx, &request);

        match self.sotw.on_request(&request) {
            RequestKind::Subscribe => {
                debug!(stream = %self.ctx.id(), type_url = %request.type_url, "subscribed");
            }
            RequestKind::Ack { version } => {
                self.state.metrics.record_ack(&request.type_url);
                debug!(
                    stream = %self.ctx.id(),
                    type_url = %request.type_url,
                    version = %version,
                    "ACK"
                );
            }
            RequestKind::Nack { .. } => {
                self.state.metrics.record_nack(&request.type_url);
                self.state.callbacks.on_stream_nack(&self.ctx, &request);
            }
            RequestKind::Stale => {
                debug!(
                    stream = %self.ctx.id(),
                    type_url = %request.type_url,
                    nonce = %request.response_nonce,
                    "ignoring stale nonce"
                );
                return Ok(());
            }
        }

        match self.state.cache.get_snapshot(node) {
            Some(snapshot) => self.push(&request.type_url, &snapshot).await,
            None => {
                debug!(stream = %self.ctx.id(), node = %node, "no snapshot for node yet");
                Ok(())
            }
        }
    }

    async fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), Closed> {
        for type_url in self.sotw.type_urls() {
            self.push(type_url.as_str(), snapshot).await?;
        }
        Ok(())
    }

    async fn push(&mut self, type_url: &str, snapshot: &Snapshot) -> Result<(), Closed> {
        let Some(response) =
            self.sotw
                .next_response(type_url, snapshot, self.control_plane.as_ref())
        else {
            return Ok(());
        };

        self.state.callbacks.on_stream_response(&self.ctx, &response);
        self.state
            .metrics
            .record_response(type_url, response.resources.len());
        self.ctx.record_response();

        self.tx
            .send(Ok(response))
            .await
            .map_err(|_| "client disconnected")
    }

    /// Resolve the stream's node, registering a watch the first time.
    fn identify(&mut self, request: &DiscoveryRequest) -> Option<NodeHash> {
        if let Some(hash) = self.ctx.node_hash() {
            return Some(hash);
        }

        let node = request.node.as_ref()?;
        let key = self.state.config.node_key.key_for(node)?;
        let hash = NodeHash::from_id(key);

        // Watch before the first read so no publish falls in between.
        self.watch = Some(self.state.cache.create_watch(hash));
        self.ctx.set_node(NodeInfo {
            id: node.id.clone(),
            cluster: node.cluster.clone(),
            hash,
        });
        info!(
            stream = %self.ctx.id(),
            node = %node.id,
            cluster = %node.cluster,
            key,
            "node identified"
        );
        Some(hash)
    }
}

async fn next_snapshot(watch: &mut Option<Watch>) -> Arc<Snapshot> {
    if let Some(w) = watch.as_mut() {
        if let Some(snapshot) = w.recv().await {
            return snapshot;
        }
        *watch = None;
    }
    std::future::pending().await
}
