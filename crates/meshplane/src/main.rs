//! meshplane control plane binary.
//!
//! Wires the registry, sync driver, snapshot cache and discovery server
//! together and runs them until SIGINT/SIGTERM or until one of them fails.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use mesh_cache::SnapshotCache;
use mesh_registry::{
    FileServiceSource, FileStore, MemoryStore, ReconcileQueue, ReconcileWorker, Reconciler,
    ServiceSource, ServiceStore, StaticServiceSource,
};
use mesh_server::{wait_for_signal, DiscoveryServer, ShutdownController};
use meshplane::config::Cli;
use meshplane::version::VERSION;
use meshplane::{telemetry, SyncDriver};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

type TaskResult = (&'static str, anyhow::Result<()>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing(&cli.log_level, cli.log_format)?;
    if let Some(addr) = cli.metrics_listen {
        telemetry::install_metrics_exporter(addr)?;
        info!(addr = %addr, "metrics exporter listening");
    }

    info!(version = VERSION, listen = %cli.listen, node_key = %cli.node_key, "starting meshplane");

    let store: Arc<dyn ServiceStore> = match &cli.store_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "persisting service lists to disk");
            Arc::new(FileStore::new(dir))
        }
        None => {
            warn!("no store directory configured, service lists are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let source: Arc<dyn ServiceSource> = match &cli.services_file {
        Some(path) => Arc::new(FileServiceSource::new(path)),
        None => {
            warn!("no services file configured, every namespace is empty");
            Arc::new(StaticServiceSource::new())
        }
    };

    let shutdown = ShutdownController::new();
    let cache = Arc::new(SnapshotCache::new());

    let driver = SyncDriver::new(Arc::clone(&store), Arc::clone(&cache), cli.driver_config());
    let (queue, receiver) = ReconcileQueue::new();
    let worker = ReconcileWorker::new(
        Arc::new(Reconciler::new(source, store)),
        queue,
        receiver,
        cli.worker_config(),
    )
    .wake_on_update(driver.waker());

    let server = DiscoveryServer::builder()
        .cache(Arc::clone(&cache))
        .config(cli.server_config())
        .shutdown_controller(shutdown.clone())
        .build()
        .context("building discovery server")?;

    let mut tasks: JoinSet<TaskResult> = JoinSet::new();

    let heartbeat =
        cache.spawn_heartbeat(cli.heartbeat_interval(), shutdown.shutdown_signal().wait());
    tasks.spawn(async move {
        ("cache heartbeat", heartbeat.await.context("heartbeat task panicked"))
    });

    let signal = shutdown.shutdown_signal();
    tasks.spawn(async move {
        worker.run(signal.wait()).await;
        ("reconcile worker", Ok(()))
    });

    let signal = shutdown.shutdown_signal();
    tasks.spawn(async move {
        driver.run(signal.wait()).await;
        ("sync driver", Ok(()))
    });

    let listen = cli.listen;
    tasks.spawn(async move {
        let result = server
            .serve(listen)
            .await
            .with_context(|| format!("serving on {listen}"));
        ("discovery server", result)
    });

    let mut failed = false;
    tokio::select! {
        result = wait_for_signal() => {
            if let Err(e) = result {
                error!(error = %e, "signal handler failed");
                failed = true;
            }
        }
        Some(joined) = tasks.join_next() => failed |= report(joined, shutdown.is_shutdown()),
    }

    info!("shutting down");
    shutdown.trigger();
    while let Some(joined) = tasks.join_next().await {
        failed |= report(joined, true);
    }

    if failed {
        return Err(anyhow!("meshplane stopped after a task failure"));
    }
    info!("meshplane stopped");
    Ok(())
}

/// Log how a task ended. Returns `true` if it failed.
fn report(joined: Result<TaskResult, JoinError>, expected: bool) -> bool {
    match joined {
        Ok((task, Ok(()))) if expected => {
            info!(task, "task stopped");
            false
        }
        Ok((task, Ok(()))) => {
            error!(task, "task exited before shutdown");
            true
        }
        Ok((task, Err(e))) => {
            let cause = format!("{e:#}");
            error!(task, error = %cause, "task failed");
            true
        }
        Err(e) => {
            error!(error = %e, "task panicked");
            true
        }
    }
}
