//! Server configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use mesh_core::MeshError;
use mesh_types::envoy::config::core::v3::Node;

/// Which field of the declared node identity keys the snapshot cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeKey {
    /// `node.id`.
    #[default]
    Id,
    /// `node.cluster`, shared by every proxy of one service.
    Cluster,
}

impl NodeKey {
    /// The cache key declared by `node`, if that field is set.
    pub fn key_for<'a>(&self, node: &'a Node) -> Option<&'a str> {
        let key = match self {
            Self::Id => node.id.as_str(),
            Self::Cluster => node.cluster.as_str(),
        };
        (!key.is_empty()).then_some(key)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Id => "id",
            Self::Cluster => "cluster",
        })
    }
}

impl FromStr for NodeKey {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "cluster" => Ok(Self::Cluster),
            other => Err(MeshError::Configuration(format!(
                "unknown node key {other:?}, expected \"id\" or \"cluster\""
            ))),
        }
    }
}

/// Configuration for the discovery server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Identifier sent as `control_plane.identifier` on every response.
    pub control_plane_id: String,
    /// Node field used as the cache key.
    pub node_key: NodeKey,
    /// Responses buffered per stream before the handler waits on the client.
    pub response_buffer_size: usize,
    /// Maximum concurrent HTTP/2 streams per connection.
    pub max_concurrent_streams: Option<u32>,
    /// HTTP/2 keepalive interval.
    pub keepalive_interval: Option<Duration>,
    /// HTTP/2 keepalive timeout.
    pub keepalive_timeout: Option<Duration>,
    /// How long open streams may drain after shutdown starts.
    pub grace_period: Duration,
    /// Serve the gRPC health service.
    pub enable_health: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            control_plane_id: "meshplane".to_string(),
            node_key: NodeKey::Id,
            response_buffer_size: 16,
            max_concurrent_streams: Some(1000),
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_timeout: Some(Duration::from_secs(10)),
            grace_period: Duration::from_secs(10),
            enable_health: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_key_selection() {
        let node = Node {
            id: "reviews-7f9c".to_string(),
            cluster: "reviews".to_string(),
            ..Default::default()
        };
        assert_eq!(NodeKey::Id.key_for(&node), Some("reviews-7f9c"));
        assert_eq!(NodeKey::Cluster.key_for(&node), Some("reviews"));

        let anonymous = Node::default();
        assert_eq!(NodeKey::Id.key_for(&anonymous), None);
    }

    #[test]
    fn node_key_parsing() {
        assert_eq!("id".parse::<NodeKey>().unwrap(), NodeKey::Id);
        assert_eq!("cluster".parse::<NodeKey>().unwrap(), NodeKey::Cluster);
        assert!("zone".parse::<NodeKey>().is_err());
        assert_eq!(NodeKey::Cluster.to_string(), "cluster");
    }
}
