//! Command-line configuration.
//!
//! Every flag can also be set through a `MESHPLANE_*` environment variable.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mesh_registry::WorkerConfig;
use mesh_server::{NodeKey, ServerConfig};

use crate::driver::DriverConfig;
use crate::telemetry::LogFormat;

/// Lightweight service mesh control plane.
#[derive(Parser, Debug, Clone)]
#[command(name = "meshplane", version, about, long_about = None)]
pub struct Cli {
    /// Address the discovery server listens on.
    #[arg(long, env = "MESHPLANE_LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Namespaces to reconcile and sync (comma separated).
    #[arg(
        long,
        env = "MESHPLANE_NAMESPACES",
        value_delimiter = ',',
        default_value = "default"
    )]
    pub namespaces: Vec<String>,

    /// Seconds between sync cycles.
    #[arg(long, env = "MESHPLANE_SYNC_INTERVAL", default_value_t = 5, value_name = "SECONDS")]
    pub sync_interval: u64,

    /// Seconds between cache heartbeats.
    #[arg(long, env = "MESHPLANE_HEARTBEAT_INTERVAL", default_value_t = 1, value_name = "SECONDS")]
    pub heartbeat_interval: u64,

    /// Seconds between full reconciles of every namespace.
    #[arg(long, env = "MESHPLANE_RESYNC_INTERVAL", default_value_t = 30, value_name = "SECONDS")]
    pub resync_interval: u64,

    /// Seconds before a failed reconcile is retried.
    #[arg(long, env = "MESHPLANE_RETRY_DELAY", default_value_t = 1, value_name = "SECONDS")]
    pub retry_delay: u64,

    /// Directory for persisted service lists. In-memory when unset.
    #[arg(long, env = "MESHPLANE_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// JSON file listing the services of each namespace.
    #[arg(long, env = "MESHPLANE_SERVICES_FILE")]
    pub services_file: Option<PathBuf>,

    /// Node field used as the cache key (`id` or `cluster`).
    #[arg(long, env = "MESHPLANE_NODE_KEY", default_value = "id")]
    pub node_key: NodeKey,

    /// Extra node id every namespace is published to (repeatable).
    #[arg(long = "extra-node", env = "MESHPLANE_EXTRA_NODES", value_delimiter = ',')]
    pub extra_nodes: Vec<String>,

    /// Identifier sent to proxies on every response.
    #[arg(long, env = "MESHPLANE_CONTROL_PLANE_ID", default_value = "meshplane")]
    pub control_plane_id: String,

    /// Seconds open streams may drain on shutdown.
    #[arg(long, env = "MESHPLANE_GRACE_PERIOD", default_value_t = 10, value_name = "SECONDS")]
    pub grace_period: u64,

    /// Address for the Prometheus exporter. Disabled when unset.
    #[arg(long, env = "MESHPLANE_METRICS_LISTEN")]
    pub metrics_listen: Option<SocketAddr>,

    /// Default log filter, overridden by `RUST_LOG`.
    #[arg(long, env = "MESHPLANE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "MESHPLANE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Discovery server settings.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            control_plane_id: self.control_plane_id.clone(),
            node_key: self.node_key,
            grace_period: Duration::from_secs(self.grace_period),
            ..ServerConfig::default()
        }
    }

    /// Sync driver settings.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            namespaces: self.namespaces.clone(),
            interval: Duration::from_secs(self.sync_interval.max(1)),
            extra_nodes: self.extra_nodes.clone(),
        }
    }

    /// Reconcile worker settings.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            namespaces: self.namespaces.clone(),
            resync_interval: Duration::from_secs(self.resync_interval.max(1)),
            retry_delay: Duration::from_secs(self.retry_delay),
        }
    }

    /// Interval between cache heartbeats.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["meshplane"]).unwrap();
        assert_eq!(cli.listen, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(cli.namespaces, vec!["default".to_string()]);
        assert_eq!(cli.node_key, NodeKey::Id);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(cli.store_dir.is_none());

        let driver = cli.driver_config();
        assert_eq!(driver.interval, Duration::from_secs(5));
        assert!(driver.extra_nodes.is_empty());
        assert_eq!(cli.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(cli.worker_config().resync_interval, Duration::from_secs(30));
        assert_eq!(cli.server_config().grace_period, Duration::from_secs(10));
    }

    #[test]
    fn explicit_flags() {
        let cli = Cli::try_parse_from([
            "meshplane",
            "--listen",
            "127.0.0.1:18000",
            "--namespaces",
            "default,shop",
            "--node-key",
            "cluster",
            "--extra-node",
            "gateway",
            "--extra-node",
            "ingress",
            "--sync-interval",
            "2",
            "--log-format",
            "json",
            "--store-dir",
            "/var/lib/meshplane",
        ])
        .unwrap();

        assert_eq!(cli.namespaces, vec!["default".to_string(), "shop".to_string()]);
        assert_eq!(cli.server_config().node_key, NodeKey::Cluster);
        assert_eq!(
            cli.driver_config().extra_nodes,
            vec!["gateway".to_string(), "ingress".to_string()]
        );
        assert_eq!(cli.driver_config().interval, Duration::from_secs(2));
        assert_eq!(cli.worker_config().namespaces.len(), 2);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.store_dir, Some(PathBuf::from("/var/lib/meshplane")));
    }

    #[test]
    fn rejects_unknown_node_key() {
        assert!(Cli::try_parse_from(["meshplane", "--node-key", "zone"]).is_err());
    }
}
