//! Registry to proxy: reconcile, persist, sync, and stream.

use std::sync::Arc;
use std::time::Duration;

use integration_tests::{cluster_names, clusters, route_config, AdsClient, TestServer};
use mesh_cache::SnapshotCache;
use mesh_core::TypeUrl;
use mesh_registry::{
    FileServiceSource, FileStore, ReconcileOutcome, ReconcileQueue, ReconcileWorker, Reconciler,
    ServiceRecord, ServiceStore, StaticServiceSource, WorkerConfig, MESH_TIMEOUT_ANNOTATION,
};
use mesh_server::DiscoveryServer;
use meshplane::{DriverConfig, SyncDriver};

fn mesh_services() -> Vec<ServiceRecord> {
    vec![
        ServiceRecord::new("reviews", "10.0.0.7", 9080).meshed(),
        ServiceRecord::new("ratings", "10.0.0.8", 9080)
            .meshed()
            .with_annotation(MESH_TIMEOUT_ANNOTATION, "2s"),
        ServiceRecord::new("legacy", "10.0.0.9", 8080),
        ServiceRecord::new("headless", "", 9080).meshed(),
    ]
}

#[tokio::test]
async fn registry_changes_reach_connected_proxies() {
    let source = Arc::new(StaticServiceSource::new());
    source.set_services("default", mesh_services());
    let store = Arc::new(mesh_registry::MemoryStore::new());

    let cache = Arc::new(SnapshotCache::new());
    let server = TestServer::start_with(Arc::clone(&cache), DiscoveryServer::builder()).await;

    let driver = SyncDriver::new(
        store.clone(),
        Arc::clone(&cache),
        DriverConfig {
            interval: Duration::from_secs(3600),
            ..DriverConfig::default()
        },
    );
    let (queue, receiver) = ReconcileQueue::new();
    let worker = ReconcileWorker::new(
        Arc::new(Reconciler::new(source.clone(), store.clone())),
        queue.clone(),
        receiver,
        WorkerConfig {
            resync_interval: Duration::from_secs(3600),
            retry_delay: Duration::from_millis(10),
            ..WorkerConfig::default()
        },
    )
    .wake_on_update(driver.waker());

    let signal = server.shutdown.shutdown_signal();
    let worker = tokio::spawn(worker.run(signal.wait()));
    let signal = server.shutdown.shutdown_signal();
    let driver = tokio::spawn(driver.run(signal.wait()));

    let mut client = AdsClient::connect(&server).await;
    client.subscribe(TypeUrl::CLUSTER, "reviews").await;
    let first = client.recv().await;
    assert_eq!(cluster_names(&first), ["ratings", "reviews"]);

    let ratings = clusters(&first).into_iter().find(|c| c.name == "ratings").unwrap();
    assert_eq!(
        ratings.connect_timeout,
        Some(prost_types::Duration {
            seconds: 2,
            nanos: 0
        })
    );
    client.ack(&first).await;

    source.upsert("default", ServiceRecord::new("details", "10.0.0.10", 9080).meshed());
    queue.enqueue("default");

    let second = client.recv().await;
    assert_eq!(cluster_names(&second), ["details", "ratings", "reviews"]);

    server.stop().await.unwrap();
    worker.await.unwrap();
    driver.await.unwrap();
}

#[tokio::test]
async fn file_backed_registry_serves_routes() {
    let dir = tempfile::tempdir().unwrap();
    let services_file = dir.path().join("services.json");
    std::fs::write(
        &services_file,
        serde_json::to_vec(&serde_json::json!({ "default": mesh_services() })).unwrap(),
    )
    .unwrap();

    let store: Arc<dyn ServiceStore> = Arc::new(FileStore::new(dir.path().join("store")));
    let reconciler = Reconciler::new(
        Arc::new(FileServiceSource::new(&services_file)),
        Arc::clone(&store),
    );
    assert_eq!(
        reconciler.reconcile("default").await.unwrap(),
        ReconcileOutcome::Updated
    );

    let cache = Arc::new(SnapshotCache::new());
    let driver = SyncDriver::new(
        store,
        Arc::clone(&cache),
        DriverConfig {
            extra_nodes: vec!["gateway".to_string()],
            ..DriverConfig::default()
        },
    );
    let report = driver.sync_once().await;
    assert_eq!(report.published, 1);

    let server = TestServer::start_with(cache, DiscoveryServer::builder()).await;
    let mut client = AdsClient::connect(&server).await;
    client.subscribe(TypeUrl::ROUTE, "gateway").await;

    let config = route_config(&client.recv().await);
    let routes: Vec<_> = config.virtual_hosts[0]
        .routes
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(routes, ["ratings", "reviews"]);

    // A second reconcile of the same file changes nothing.
    assert_eq!(
        reconciler.reconcile("default").await.unwrap(),
        ReconcileOutcome::Unchanged
    );

    server.stop().await.unwrap();
}
