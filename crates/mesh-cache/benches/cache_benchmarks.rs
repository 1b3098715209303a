//! Benchmarks for mesh-cache operations.
//!
//! Run with: `cargo bench --package mesh-cache`
//!
//! These benchmarks measure:
//! - Publishing to one node and fanning one snapshot out to many
//! - Snapshot reads (hits and misses)
//! - A mixed read/write workload
//! - Heartbeat rounds with live watches

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mesh_cache::{Cache, ResourceSet, SnapshotCache};
use mesh_core::{AnyResource, BoxResource, NodeHash, TypeUrl};

/// A resource set shaped like a translated service list.
fn resource_set(services: usize) -> ResourceSet {
    let clusters: Vec<BoxResource> = (0..services)
        .map(|i| {
            Arc::new(AnyResource::new(
                format!("svc-{i}"),
                prost_types::Any {
                    type_url: TypeUrl::CLUSTER.to_string(),
                    value: vec![0u8; 96],
                },
            )) as BoxResource
        })
        .collect();
    let route: BoxResource = Arc::new(AnyResource::new(
        "outbound_route",
        prost_types::Any {
            type_url: TypeUrl::ROUTE.to_string(),
            value: vec![0u8; 64 * services.max(1)],
        },
    ));

    ResourceSet::new()
        .with_type(TypeUrl::CLUSTER, clusters)
        .with_type(TypeUrl::ROUTE, vec![route])
        .with_type(TypeUrl::ENDPOINT, vec![])
        .with_type(TypeUrl::LISTENER, vec![])
}

fn nodes(count: usize) -> Vec<NodeHash> {
    (0..count)
        .map(|i| NodeHash::from_id(&format!("node-{i}")))
        .collect()
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    for services in [1, 10, 100, 1000] {
        group.throughput(Throughput::Elements(services as u64));
        group.bench_with_input(BenchmarkId::from_parameter(services), &services, |b, &n| {
            let cache = SnapshotCache::new();
            let node = NodeHash::from_id("node-0");
            let set = resource_set(n);

            b.iter(|| black_box(cache.publish(node, &set)));
        });
    }

    group.finish();
}

fn bench_publish_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_many");

    for num_nodes in [1, 10, 100, 1000] {
        group.throughput(Throughput::Elements(num_nodes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_nodes), &num_nodes, |b, &n| {
            let cache = SnapshotCache::new();
            let targets = nodes(n);
            let set = resource_set(50);

            b.iter(|| black_box(cache.publish_many(targets.iter().copied(), &set)));
        });
    }

    group.finish();
}

fn bench_get_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_snapshot");

    for num_nodes in [1, 10, 100, 1000] {
        group.throughput(Throughput::Elements(num_nodes as u64));

        group.bench_with_input(BenchmarkId::new("hit", num_nodes), &num_nodes, |b, &n| {
            let cache = SnapshotCache::new();
            let targets = nodes(n);
            let _ = cache.publish_many(targets.iter().copied(), &resource_set(10));

            b.iter(|| {
                for node in &targets {
                    black_box(cache.get_snapshot(*node));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("miss", num_nodes), &num_nodes, |b, &n| {
            let cache = SnapshotCache::new();
            let targets = nodes(n);

            b.iter(|| {
                for node in &targets {
                    black_box(cache.get_snapshot(*node));
                }
            });
        });
    }

    group.finish();
}

fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_workload");

    // 90% reads, 10% writes
    group.bench_function("90_read_10_write", |b| {
        let cache = SnapshotCache::new();
        let targets = nodes(100);
        let set = resource_set(20);
        let _ = cache.publish_many(targets.iter().copied(), &set);

        let mut counter = 0usize;
        b.iter(|| {
            counter += 1;
            let node = targets[counter % targets.len()];
            if counter % 10 == 0 {
                black_box(cache.publish(node, &set)).ok();
            } else {
                black_box(cache.get_snapshot(node));
            }
        });
    });

    group.finish();
}

fn bench_heartbeat(c: &mut Criterion) {
    let mut group = c.benchmark_group("heartbeat");

    for num_nodes in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(num_nodes), &num_nodes, |b, &n| {
            let cache = SnapshotCache::new();
            let targets = nodes(n);
            let _ = cache.publish_many(targets.iter().copied(), &resource_set(10));
            // Watches are never drained, so after the first rounds every
            // notification exercises the full-channel path.
            let _watches: Vec<_> = targets.iter().map(|n| cache.create_watch(*n)).collect();

            b.iter(|| black_box(cache.heartbeat()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_publish,
    bench_publish_many,
    bench_get_snapshot,
    bench_mixed_workload,
    bench_heartbeat,
);

criterion_main!(benches);
