//! Load tests with 1000+ nodes.
//!
//! These tests check the cache and the ADS handler under fan-out:
//! - 1000 nodes published individually and concurrently
//! - One publish notifying 1000 watches
//! - Hundreds of concurrent streams following a publish
//!
//! Run with: `cargo test --package integration-tests --test load_tests -- --nocapture`

use std::sync::Arc;
use std::time::Instant;

use mesh_cache::{Cache, SnapshotCache};
use mesh_core::{CanonicalList, NodeHash, ServiceMeta, TypeUrl};
use mesh_server::DiscoveryServer;
use mesh_types::envoy::service::discovery::v3::DiscoveryRequest;
use meshplane::translate;
use tokio::sync::{mpsc, Barrier};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

fn sidecars(count: usize) -> Vec<NodeHash> {
    (0..count)
        .map(|i| NodeHash::from_id(&format!("sidecar-{i}")))
        .collect()
}

fn service_list(count: usize) -> CanonicalList {
    let records = (0..count)
        .map(|i| ServiceMeta::new(format!("svc-{i}"), format!("10.0.{}.{}", i / 250, i % 250 + 1), 8080))
        .collect();
    CanonicalList::from_records(records).0
}

#[tokio::test]
async fn publish_1000_nodes() {
    let cache = SnapshotCache::new();
    let nodes = sidecars(1000);
    let resources = translate(&service_list(50));

    let start = Instant::now();
    for node in &nodes {
        cache.publish(*node, &resources).unwrap();
    }
    let duration = start.elapsed();
    println!(
        "Published {} snapshots in {:?} ({:.2} µs/op)",
        nodes.len(),
        duration,
        duration.as_micros() as f64 / nodes.len() as f64
    );

    for node in &nodes {
        assert!(cache.get_snapshot(*node).is_some());
    }

    let stats = cache.stats();
    assert_eq!(cache.snapshot_count(), nodes.len());
    assert_eq!(stats.snapshots_published(), nodes.len() as u64);
    assert_eq!(stats.snapshot_hits(), nodes.len() as u64);
    assert_eq!(stats.hit_rate(), 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishers() {
    let cache = Arc::new(SnapshotCache::new());
    let nodes = sidecars(1000);
    let num_tasks = 10;
    let per_task = nodes.len() / num_tasks;
    let barrier = Arc::new(Barrier::new(num_tasks));

    let start = Instant::now();
    let mut handles = Vec::new();
    for chunk in nodes.chunks(per_task) {
        let cache = Arc::clone(&cache);
        let barrier = Arc::clone(&barrier);
        let chunk = chunk.to_vec();
        handles.push(tokio::spawn(async move {
            let resources = translate(&service_list(10));
            barrier.wait().await;
            for node in chunk {
                cache.publish(node, &resources).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.expect("publisher panicked");
    }
    println!("Concurrent publish of {} nodes in {:?}", nodes.len(), start.elapsed());

    assert_eq!(cache.snapshot_count(), nodes.len());
    assert_eq!(cache.stats().stale_publishes(), 0);
}

#[tokio::test]
async fn one_publish_notifies_1000_watches() {
    let cache = SnapshotCache::new();
    let nodes = sidecars(1000);
    let mut watches: Vec<_> = nodes.iter().map(|node| cache.create_watch(*node)).collect();

    let start = Instant::now();
    let version = cache
        .publish_many(nodes.iter().copied(), &translate(&service_list(20)))
        .unwrap();
    println!("publish_many to {} nodes in {:?}", nodes.len(), start.elapsed());

    let mut received = 0;
    for watch in &mut watches {
        let snapshot = watch.try_recv().expect("watch should be notified");
        assert_eq!(snapshot.version(), &version);
        received += 1;
    }
    assert_eq!(received, nodes.len());

    for watch in &watches {
        cache.cancel_watch(watch);
    }
    assert_eq!(cache.watches().total_watch_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundreds_of_streams_follow_a_publish() {
    let cache = Arc::new(SnapshotCache::new());
    let server = DiscoveryServer::builder()
        .cache(Arc::clone(&cache))
        .build()
        .unwrap();
    let ads = server.ads_service();
    let num_streams = 250;

    let mut streams = Vec::new();
    for i in 0..num_streams {
        let (tx, rx) = mpsc::channel(4);
        let responses = ads
            .open_stream(ReceiverStream::new(rx).map(Ok))
            .expect("stream should open");
        tx.send(DiscoveryRequest {
            node: Some(mesh_types::envoy::config::core::v3::Node {
                id: format!("sidecar-{}", i % 50),
                ..Default::default()
            }),
            type_url: TypeUrl::CLUSTER.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        streams.push((tx, responses));
    }

    let start = Instant::now();
    let version = cache
        .publish_many(sidecars(50), &translate(&service_list(100)))
        .unwrap();

    for (_tx, responses) in &mut streams {
        let response = tokio::time::timeout(integration_tests::RECV_TIMEOUT, responses.next())
            .await
            .expect("stream should receive the publish")
            .expect("stream open")
            .expect("response ok");
        assert_eq!(response.version_info, version.to_string());
        assert_eq!(response.resources.len(), 100);
    }
    println!("{num_streams} streams received the publish in {:?}", start.elapsed());
    assert_eq!(server.metrics().active_streams(), num_streams as u64);

    drop(streams);
}
