//! # mesh-core
//!
//! Core types, traits, and error handling for the meshplane control plane.
//!
//! This crate provides the foundational types used across all other mesh crates:
//!
//! - [`MeshError`] - Error type with gRPC status code mapping
//! - [`ServiceMeta`] / [`CanonicalList`] - The canonical service model
//! - [`ResourceVersion`] / [`VersionClock`] - Snapshot version tokens
//! - [`NodeHash`] - Node identification using FNV-1a hashing
//! - [`Resource`] - Trait for discovery resource payloads
//! - [`TypeUrl`] - Type URL handling and constants
//!
//! ## Example
//!
//! ```rust
//! use mesh_core::{CanonicalList, ConnectTimeout, NodeHash, ServiceMeta, VersionClock};
//!
//! let node = NodeHash::from_id("reviews");
//! let version = VersionClock::with_epoch(42).next();
//! assert_eq!(version.as_str(), "42-v1");
//!
//! let (list, _) = CanonicalList::from_records(vec![
//!     ServiceMeta::new("reviews", "10.0.0.7", 9080)
//!         .with_timeout(ConnectTimeout::from_annotation(Some("2s"))),
//! ]);
//! assert_eq!(list.len(), 1);
//! # let _ = node;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod duration;
mod error;
mod node;
mod resource;
mod service;
mod type_url;
mod version;

pub use error::{BoxError, MeshError};
pub use node::NodeHash;
pub use resource::{AnyResource, BoxResource, Resource};
pub use service::{
    CanonicalList, ConnectTimeout, ServiceMeta, MAX_CONNECT_TIMEOUT, MIN_CONNECT_TIMEOUT,
    UNSET_TIMEOUT_TEXT,
};
pub use type_url::TypeUrl;
pub use version::{ResourceVersion, VersionClock};

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;
