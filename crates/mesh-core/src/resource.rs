//! Resource trait for discovery payloads.
//!
//! The snapshot cache treats resources as opaque payloads. Anything that
//! can name itself, report its type URL, and encode to a protobuf `Any`
//! can be stored in a snapshot and pushed to a proxy.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Result;

/// Trait for discovery resources.
///
/// # Example
///
/// ```rust
/// use mesh_core::{Resource, Result, TypeUrl};
/// use std::any::Any as StdAny;
///
/// #[derive(Debug)]
/// struct Placeholder {
///     name: String,
/// }
///
/// impl Resource for Placeholder {
///     fn type_url(&self) -> &str {
///         TypeUrl::CLUSTER
///     }
///
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn encode(&self) -> Result<prost_types::Any> {
///         Ok(prost_types::Any {
///             type_url: self.type_url().to_string(),
///             value: self.name.as_bytes().to_vec(),
///         })
///     }
///
///     fn as_any(&self) -> &dyn StdAny {
///         self
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Get the type URL for this resource.
    fn type_url(&self) -> &str;

    /// Get the resource name.
    fn name(&self) -> &str;

    /// Encode the resource to a protobuf Any message.
    ///
    /// Encoding must be deterministic: the same resource always yields the
    /// same bytes.
    fn encode(&self) -> Result<prost_types::Any>;

    /// Convert to Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Shared, immutable resource handle.
pub type BoxResource = Arc<dyn Resource>;

/// A pre-encoded protobuf `Any` stored as a resource.
#[derive(Debug, Clone)]
pub struct AnyResource {
    name: String,
    any: prost_types::Any,
}

impl AnyResource {
    /// Wrap an already-encoded message.
    #[must_use]
    pub fn new(name: impl Into<String>, any: prost_types::Any) -> Self {
        Self {
            name: name.into(),
            any,
        }
    }

    /// Get the inner Any message.
    #[must_use]
    pub fn inner(&self) -> &prost_types::Any {
        &self.any
    }
}

impl Resource for AnyResource {
    fn type_url(&self) -> &str {
        &self.any.type_url
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> Result<prost_types::Any> {
        Ok(self.any.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
