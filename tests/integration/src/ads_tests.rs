//! ADS over a real gRPC connection.

use std::sync::Arc;
use std::time::Duration;

use integration_tests::{cluster_names, route_config, AdsClient, TestServer};
use mesh_cache::{Cache, SnapshotCache};
use mesh_core::{CanonicalList, NodeHash, ServiceMeta, TypeUrl};
use mesh_server::DiscoveryServer;
use meshplane::{translate, ROUTE_CONFIG_NAME};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

fn publish(server: &TestServer, node: &str, services: &[(&str, &str, u16)]) {
    let records = services
        .iter()
        .map(|(name, ip, port)| ServiceMeta::new(*name, *ip, *port))
        .collect();
    let (list, _) = CanonicalList::from_records(records);
    server
        .cache
        .publish(NodeHash::from_id(node), &translate(&list))
        .unwrap();
}

#[tokio::test]
async fn subscribe_receives_published_clusters() {
    let server = TestServer::start().await;
    publish(
        &server,
        "reviews",
        &[("reviews", "10.0.0.7", 9080), ("ratings", "10.0.0.8", 9080)],
    );

    let mut client = AdsClient::connect(&server).await;
    client.subscribe(TypeUrl::CLUSTER, "reviews").await;

    let response = client.recv().await;
    assert_eq!(response.type_url, TypeUrl::CLUSTER);
    assert!(!response.version_info.is_empty());
    assert!(!response.nonce.is_empty());
    assert_eq!(cluster_names(&response), ["ratings", "reviews"]);
    assert_eq!(
        response.control_plane.unwrap().identifier,
        "meshplane".to_string()
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn route_configuration_is_served() {
    let server = TestServer::start().await;
    publish(&server, "reviews", &[("reviews", "10.0.0.7", 9080)]);

    let mut client = AdsClient::connect(&server).await;
    client.subscribe(TypeUrl::ROUTE, "reviews").await;

    let config = route_config(&client.recv().await);
    assert_eq!(config.name, ROUTE_CONFIG_NAME);
    assert_eq!(config.virtual_hosts[0].routes[0].name, "reviews");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn acked_stream_follows_new_versions() {
    let server = TestServer::start().await;
    publish(&server, "reviews", &[("reviews", "10.0.0.7", 9080)]);

    let mut client = AdsClient::connect(&server).await;
    client.subscribe(TypeUrl::CLUSTER, "reviews").await;
    let first = client.recv().await;
    client.ack(&first).await;
    client.assert_quiet(Duration::from_millis(200)).await;

    publish(
        &server,
        "reviews",
        &[("reviews", "10.0.0.7", 9080), ("ratings", "10.0.0.8", 9080)],
    );
    let second = client.recv().await;
    assert_ne!(second.version_info, first.version_info);
    assert_ne!(second.nonce, first.nonce);
    assert_eq!(cluster_names(&second), ["ratings", "reviews"]);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn unacked_response_holds_back_newer_versions() {
    let server = TestServer::start().await;
    publish(&server, "reviews", &[("reviews", "10.0.0.7", 9080)]);

    let mut client = AdsClient::connect(&server).await;
    client.subscribe(TypeUrl::CLUSTER, "reviews").await;
    let first = client.recv().await;

    publish(&server, "reviews", &[("ratings", "10.0.0.8", 9080)]);
    client.assert_quiet(Duration::from_millis(200)).await;

    client.ack(&first).await;
    let second = client.recv().await;
    assert_eq!(cluster_names(&second), ["ratings"]);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn nack_waits_for_the_next_publish() {
    let server = TestServer::start().await;
    publish(&server, "reviews", &[("reviews", "10.0.0.7", 9080)]);

    let mut client = AdsClient::connect(&server).await;
    client.subscribe(TypeUrl::CLUSTER, "reviews").await;
    let rejected = client.recv().await;
    client.nack(&rejected, "").await;
    client.assert_quiet(Duration::from_millis(200)).await;

    publish(&server, "reviews", &[("reviews", "10.0.0.9", 9080)]);
    let fixed = client.recv().await;
    assert_ne!(fixed.version_info, rejected.version_info);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn subscription_waits_for_first_snapshot() {
    let server = TestServer::start().await;

    let mut client = AdsClient::connect(&server).await;
    client.subscribe(TypeUrl::CLUSTER, "reviews").await;
    client.assert_quiet(Duration::from_millis(200)).await;

    publish(&server, "reviews", &[("reviews", "10.0.0.7", 9080)]);
    assert_eq!(cluster_names(&client.recv().await), ["reviews"]);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn one_stream_carries_every_type() {
    let server = TestServer::start().await;
    publish(&server, "reviews", &[("reviews", "10.0.0.7", 9080)]);

    let mut client = AdsClient::connect(&server).await;
    let mut seen = Vec::new();
    for type_url in TypeUrl::ALL {
        client.subscribe(type_url, "reviews").await;
        let response = client.recv().await;
        seen.push(response.type_url.clone());
        client.ack(&response).await;
    }
    assert_eq!(seen, TypeUrl::ALL);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn nodes_are_isolated() {
    let server = TestServer::start().await;
    publish(&server, "reviews", &[("reviews", "10.0.0.7", 9080)]);
    publish(&server, "ratings", &[("ratings", "10.0.0.8", 9080)]);

    let mut reviews = AdsClient::connect(&server).await;
    let mut ratings = AdsClient::connect(&server).await;
    reviews.subscribe(TypeUrl::CLUSTER, "reviews").await;
    ratings.subscribe(TypeUrl::CLUSTER, "ratings").await;

    assert_eq!(cluster_names(&reviews.recv().await), ["reviews"]);
    assert_eq!(cluster_names(&ratings.recv().await), ["ratings"]);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn health_reports_serving() {
    let server = TestServer::start().await;

    let mut health = HealthClient::new(
        tonic::transport::Endpoint::new(server.endpoint())
            .unwrap()
            .connect()
            .await
            .unwrap(),
    );
    for service in ["", "envoy.service.discovery.v3.AggregatedDiscoveryService"] {
        let status = health
            .check(HealthCheckRequest {
                service: service.to_string(),
            })
            .await
            .unwrap()
            .into_inner()
            .status;
        assert_eq!(status, ServingStatus::Serving as i32, "{service:?}");
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn health_can_be_disabled() {
    let server = TestServer::start_with(
        Arc::new(SnapshotCache::new()),
        DiscoveryServer::builder().disable_health(),
    )
    .await;

    let mut health = HealthClient::new(
        tonic::transport::Endpoint::new(server.endpoint())
            .unwrap()
            .connect()
            .await
            .unwrap(),
    );
    let err = health
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::Unimplemented);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_open_streams() {
    let server = TestServer::start().await;
    publish(&server, "reviews", &[("reviews", "10.0.0.7", 9080)]);

    let mut client = AdsClient::connect(&server).await;
    client.subscribe(TypeUrl::CLUSTER, "reviews").await;
    client.recv().await;

    let cache = Arc::clone(&server.cache);
    server.stop().await.unwrap();
    client.closed().await;

    for _ in 0..100 {
        if cache.watches().total_watch_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("stream watches were not released");
}
