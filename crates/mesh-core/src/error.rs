//! Error types for control plane operations.
//!
//! This module provides [`MeshError`], the error type shared by every
//! meshplane crate. It covers the durable store, the cluster service source,
//! canonical list (de)serialization, resource encoding and the discovery
//! protocol, and converts to gRPC status codes.

/// Boxed error used as the `source` of wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for control plane operations.
///
/// Variants follow the failure taxonomy of the pipeline:
/// - transient upstream failures ([`MeshError::Store`], [`MeshError::Source`])
///   are surfaced to the trigger that invoked the operation
/// - [`MeshError::StoreNotFound`] is recovered locally by the reconciler
/// - serialization failures are hard errors for one reconciliation cycle
/// - protocol failures only ever affect one stream
///
/// # Example
///
/// ```rust
/// use mesh_core::MeshError;
///
/// fn read(key: &str, present: bool) -> Result<(), MeshError> {
///     if !present {
///         return Err(MeshError::StoreNotFound { key: key.to_string() });
///     }
///     Ok(())
/// }
///
/// assert!(read("default/mesh-map", false).unwrap_err().is_not_found());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// The durable store holds no object under the key.
    #[error("store object not found: {key}")]
    StoreNotFound {
        /// The store key that was looked up.
        key: String,
    },

    /// The durable store failed for a reason other than not-found.
    #[error("store error for {key}: {message}")]
    Store {
        /// The store key being accessed.
        key: String,
        /// Description of the failure.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// The cluster service source could not be listed.
    #[error("service source error for namespace {namespace}: {message}")]
    Source {
        /// Namespace that was being listed.
        namespace: String,
        /// Description of the failure.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// The canonical service list could not be serialized.
    #[error("failed to serialize service list for {namespace}: {source}")]
    Serialization {
        /// Namespace the list belongs to.
        namespace: String,
        /// Underlying error.
        #[source]
        source: BoxError,
    },

    /// A persisted canonical service list is malformed.
    #[error("malformed service list for {namespace}: {source}")]
    Deserialization {
        /// Namespace the list belongs to.
        namespace: String,
        /// Underlying error.
        #[source]
        source: BoxError,
    },

    /// A resource could not be encoded for the wire.
    #[error("encoding error for {type_url}/{name}: {message}")]
    Encoding {
        /// Type URL of the resource.
        type_url: String,
        /// Resource name.
        name: String,
        /// Error message.
        message: String,
    },

    /// A discovery request was malformed.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Why the request was rejected.
        reason: String,
    },

    /// Client stream closed unexpectedly.
    #[error("stream closed: {reason}")]
    StreamClosed {
        /// Reason for stream closure.
        reason: String,
    },

    /// The control plane is shutting down.
    #[error("control plane is shutting down")]
    Shutdown,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl MeshError {
    /// Create a store error from any error type.
    pub fn store<E>(key: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store {
            key: key.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a service source error from any error type.
    pub fn source<E>(namespace: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source {
            namespace: namespace.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error from any error type.
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this error is the store's not-found condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StoreNotFound { .. })
    }
}

/// Convert to tonic::Status for gRPC responses.
impl From<MeshError> for tonic::Status {
    fn from(err: MeshError) -> Self {
        match &err {
            MeshError::StoreNotFound { .. } => tonic::Status::not_found(err.to_string()),
            MeshError::Store { .. } | MeshError::Source { .. } => {
                tonic::Status::unavailable(err.to_string())
            }
            MeshError::Serialization { .. }
            | MeshError::Deserialization { .. }
            | MeshError::Encoding { .. }
            | MeshError::Internal { .. } => tonic::Status::internal(err.to_string()),
            MeshError::InvalidRequest { .. } | MeshError::Configuration(_) => {
                tonic::Status::invalid_argument(err.to_string())
            }
            MeshError::StreamClosed { .. } | MeshError::Shutdown => {
                tonic::Status::unavailable(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeshError::StoreNotFound {
            key: "default/mesh-map".to_string(),
        };
        assert!(err.to_string().contains("default/mesh-map"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_to_status() {
        let err = MeshError::InvalidRequest {
            reason: "missing type_url".to_string(),
        };
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = MeshError::Shutdown.into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[test]
    fn test_store_error_helper() {
        let io_err = std::io::Error::other("disk full");
        let err = MeshError::store("default/mesh-map", "write failed", io_err);
        assert!(matches!(err, MeshError::Store { .. }));
        assert!(!err.is_not_found());
        assert!(std::error::Error::source(&err).is_some());
    }
}
