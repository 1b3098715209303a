//! Shared harness for the meshplane integration tests.
//!
//! [`TestServer`] runs a real discovery server on a loopback port and
//! [`AdsClient`] talks to it through the generated gRPC client, so these
//! tests exercise the same transport a proxy would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mesh_cache::SnapshotCache;
use mesh_server::{DiscoveryServer, DiscoveryServerBuilder, ShutdownController};
use mesh_types::envoy::config::cluster::v3::Cluster;
use mesh_types::envoy::config::core::v3::Node;
use mesh_types::envoy::config::route::v3::RouteConfiguration;
use mesh_types::envoy::service::discovery::v3::aggregated_discovery_service_client::AggregatedDiscoveryServiceClient;
use mesh_types::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use mesh_types::google::rpc::Status as RpcStatus;
use prost::Message;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Streaming;

/// How long a test waits for something that should happen.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A discovery server on `127.0.0.1` with an ephemeral port.
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// Cache the server distributes.
    pub cache: Arc<SnapshotCache>,
    /// Controller shared with the server.
    pub shutdown: ShutdownController,
    handle: JoinHandle<mesh_core::Result<()>>,
}

impl TestServer {
    /// Start a server with default settings and a fresh cache.
    pub async fn start() -> Self {
        Self::start_with(Arc::new(SnapshotCache::new()), DiscoveryServer::builder()).await
    }

    /// Start a server from `builder`, distributing `cache`.
    pub async fn start_with(cache: Arc<SnapshotCache>, builder: DiscoveryServerBuilder) -> Self {
        let shutdown = ShutdownController::new();
        let server = builder
            .cache(Arc::clone(&cache))
            .shutdown_controller(shutdown.clone())
            .grace_period(Duration::from_secs(2))
            .build()
            .expect("server should build");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(server.serve_with_listener(listener));

        Self {
            addr,
            cache,
            shutdown,
            handle,
        }
    }

    /// URI for gRPC clients.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Trigger shutdown and wait for the server task.
    pub async fn stop(self) -> mesh_core::Result<()> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server should stop within the grace period")
            .expect("server task panicked")
    }
}

/// One ADS stream to a [`TestServer`].
pub struct AdsClient {
    requests: mpsc::Sender<DiscoveryRequest>,
    responses: Streaming<DiscoveryResponse>,
}

impl AdsClient {
    /// Connect and open the aggregated stream.
    pub async fn connect(server: &TestServer) -> Self {
        let mut client = AggregatedDiscoveryServiceClient::connect(server.endpoint())
            .await
            .expect("connect to discovery server");
        let (requests, rx) = mpsc::channel(16);
        let responses = client
            .stream_aggregated_resources(ReceiverStream::new(rx))
            .await
            .expect("open ADS stream")
            .into_inner();
        Self {
            requests,
            responses,
        }
    }

    /// Send a raw request.
    pub async fn send(&self, request: DiscoveryRequest) {
        self.requests
            .send(request)
            .await
            .expect("request stream closed");
    }

    /// Subscribe to `type_url` as node `node_id`.
    pub async fn subscribe(&self, type_url: &str, node_id: &str) {
        self.send(subscribe_request(type_url, node_id)).await;
    }

    /// Accept `response`.
    pub async fn ack(&self, response: &DiscoveryResponse) {
        self.send(ack_request(response)).await;
    }

    /// Reject `response`, reporting `held` as the version still applied.
    pub async fn nack(&self, response: &DiscoveryResponse, held: &str) {
        self.send(DiscoveryRequest {
            version_info: held.to_string(),
            error_detail: Some(RpcStatus {
                code: 3,
                message: "rejected by test".to_string(),
                details: vec![],
            }),
            ..ack_request(response)
        })
        .await;
    }

    /// Next response, failing the test after [`RECV_TIMEOUT`].
    pub async fn recv(&mut self) -> DiscoveryResponse {
        tokio::time::timeout(RECV_TIMEOUT, self.responses.message())
            .await
            .expect("timed out waiting for a response")
            .expect("stream failed")
            .expect("stream ended")
    }

    /// Assert nothing arrives for `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(message) = tokio::time::timeout(window, self.responses.message()).await {
            panic!("expected no response, got {message:?}");
        }
    }

    /// Wait until the server ends the stream.
    pub async fn closed(&mut self) {
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, self.responses.message())
                .await
                .expect("stream should end")
            {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return,
            }
        }
    }
}

/// First request of a subscription.
pub fn subscribe_request(type_url: &str, node_id: &str) -> DiscoveryRequest {
    DiscoveryRequest {
        node: Some(Node {
            id: node_id.to_string(),
            cluster: "mesh".to_string(),
            ..Default::default()
        }),
        type_url: type_url.to_string(),
        ..Default::default()
    }
}

/// ACK of `response`.
pub fn ack_request(response: &DiscoveryResponse) -> DiscoveryRequest {
    DiscoveryRequest {
        version_info: response.version_info.clone(),
        response_nonce: response.nonce.clone(),
        type_url: response.type_url.clone(),
        ..Default::default()
    }
}

/// Decode the clusters carried by `response`.
pub fn clusters(response: &DiscoveryResponse) -> Vec<Cluster> {
    response
        .resources
        .iter()
        .map(|any| Cluster::decode(any.value.as_slice()).expect("valid cluster"))
        .collect()
}

/// Names of the clusters carried by `response`.
pub fn cluster_names(response: &DiscoveryResponse) -> Vec<String> {
    clusters(response).into_iter().map(|c| c.name).collect()
}

/// Decode the single route configuration carried by `response`.
pub fn route_config(response: &DiscoveryResponse) -> RouteConfiguration {
    assert_eq!(response.resources.len(), 1, "one route configuration");
    RouteConfiguration::decode(response.resources[0].value.as_slice()).expect("valid route config")
}
