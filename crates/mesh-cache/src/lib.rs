//! # mesh-cache
//!
//! Per-node snapshot cache for the meshplane control plane.
//!
//! This crate provides the caching layer between the sync driver, which
//! publishes, and the ADS server, which reads:
//!
//! - [`SnapshotCache`] - DashMap-based concurrent cache of snapshots per node
//! - [`ResourceSet`] / [`Snapshot`] - Resources grouped by type, versioned
//! - [`Watch`] - Subscription to a node's publishes and heartbeats
//!
//! ## Key Design Decisions
//!
//! - Every publish mints a fresh version; the cache does not compare content
//! - Snapshots are immutable and atomically replaced behind an `Arc`
//! - All `DashMap` references are dropped before watches are notified
//! - Watch notifications never block the publisher
//! - Each resource type carries a content fingerprint so readers can skip
//!   pushes of content a client already holds
//!
//! ## Example
//!
//! ```rust
//! use mesh_cache::{Cache, ResourceSet, SnapshotCache};
//! use mesh_core::{NodeHash, TypeUrl};
//!
//! let cache = SnapshotCache::new();
//! let node = NodeHash::from_id("reviews");
//!
//! let resources = ResourceSet::new().with_type(TypeUrl::CLUSTER, vec![]);
//! let version = cache.publish(node, &resources)?;
//!
//! assert_eq!(cache.get_snapshot(node).unwrap().version(), &version);
//! # Ok::<(), mesh_core::MeshError>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod snapshot;
mod stats;
mod watch;

pub use cache::{Cache, CacheBuilder, SnapshotCache};
pub use snapshot::{ResourceSet, Snapshot, SnapshotResources};
pub use stats::CacheStats;
pub use watch::{NotifyOutcome, Watch, WatchId, WatchManager};
