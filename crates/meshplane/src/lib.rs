//! # meshplane
//!
//! Lightweight service mesh control plane.
//!
//! meshplane keeps the sidecar proxies of a cluster in sync with its
//! service membership:
//!
//! 1. The registry ([`mesh_registry`]) reconciles each namespace's meshed
//!    services into a persisted canonical list.
//! 2. The [`SyncDriver`] reads those lists, [`translate`]s them into
//!    clusters and routes, and publishes versioned snapshots into the cache
//!    ([`mesh_cache`]).
//! 3. The discovery server ([`mesh_server`]) streams the snapshots to every
//!    connected proxy over ADS.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meshplane::prelude::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cache = Arc::new(SnapshotCache::new());
//! let store = Arc::new(MemoryStore::new());
//!
//! let driver = SyncDriver::new(store, Arc::clone(&cache), DriverConfig::default());
//! tokio::spawn(driver.run(std::future::pending()));
//!
//! DiscoveryServer::builder()
//!     .cache(cache)
//!     .build()?
//!     .serve("0.0.0.0:5000".parse()?)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - `mesh-core` - Service records, resources and error handling
//! - `mesh-types` - Generated protobuf types
//! - `mesh-registry` - Service reconciliation and persistence
//! - `mesh-cache` - Versioned snapshot cache with watches
//! - `mesh-server` - ADS gRPC server
//!
//! This crate adds the translation and sync layer and the `meshplane`
//! binary, and re-exports the rest for convenience.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod driver;
pub mod telemetry;
mod translator;

pub use driver::{CycleReport, DriverConfig, SyncDriver};
pub use translator::{
    build_cluster, build_route_config, translate, ROUTE_CONFIG_NAME, SERVICE_HEADER,
    VIRTUAL_HOST_NAME,
};

pub use mesh_cache as cache;
pub use mesh_core as core;
pub use mesh_registry as registry;
pub use mesh_server as server;
pub use mesh_types as types;

/// Prelude module for convenient imports.
///
/// ```rust
/// use meshplane::prelude::*;
/// ```
pub mod prelude {
    pub use mesh_core::{
        BoxResource, CanonicalList, ConnectTimeout, MeshError, NodeHash, Resource,
        ResourceVersion, ServiceMeta, TypeUrl,
    };

    pub use mesh_cache::{Cache, ResourceSet, Snapshot, SnapshotCache, Watch};

    pub use mesh_registry::{
        FileServiceSource, FileStore, MemoryStore, ReconcileQueue, ReconcileWorker, Reconciler,
        ServiceRecord, ServiceSource, ServiceStore, StaticServiceSource, WorkerConfig,
    };

    pub use mesh_server::{
        DiscoveryServer, NodeKey, ServerConfig, ShutdownController, StreamCallbacks,
    };

    pub use crate::driver::{DriverConfig, SyncDriver};
    pub use crate::translator::translate;
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("meshplane {} (MSRV {})", VERSION, MSRV)
    }
}
