//! # mesh-registry
//!
//! Service registry reconciliation for the meshplane control plane.
//!
//! The registry watches cluster service membership and keeps one
//! persisted [`CanonicalList`](mesh_core::CanonicalList) per namespace:
//!
//! - [`ServiceSource`] - Lists the services of a namespace
//! - [`ServiceStore`] - Durable key/value storage for the lists
//! - [`Reconciler`] - Builds a list and writes it only when it changed
//! - [`ReconcileQueue`] / [`ReconcileWorker`] - Coalesced triggers, retries
//!   and periodic resync
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mesh_registry::{MemoryStore, ReconcileOutcome, Reconciler, ServiceRecord, StaticServiceSource};
//!
//! # tokio_test_block(async {
//! let source = Arc::new(StaticServiceSource::new());
//! source.set_services("default", vec![ServiceRecord::new("reviews", "10.0.0.7", 9080).meshed()]);
//!
//! let reconciler = Reconciler::new(source, Arc::new(MemoryStore::new()));
//! assert_eq!(reconciler.reconcile("default").await?, ReconcileOutcome::Updated);
//! assert_eq!(reconciler.reconcile("default").await?, ReconcileOutcome::Unchanged);
//! # Ok::<(), mesh_core::MeshError>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future<Output = mesh_core::Result<()>>>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f).unwrap();
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod queue;
mod reconciler;
mod source;
mod store;

pub use queue::{QueueReceiver, ReconcileQueue, ReconcileWorker, WorkerConfig, IGNORED_NAMESPACE};
pub use reconciler::{ReconcileOutcome, Reconciler, ReconcilerConfig};
pub use source::{
    FileServiceSource, LabelSelector, ServicePort, ServiceRecord, ServiceSource,
    StaticServiceSource, MESH_SELECTOR_KEY, MESH_SELECTOR_VALUE, MESH_TIMEOUT_ANNOTATION,
};
pub use store::{load_canonical_list, store_key, FileStore, MemoryStore, ServiceStore, STORE_OBJECT_NAME};
