//! Shutdown coordination for the control plane.
//!
//! One [`ShutdownController`] is the cancellation signal for the whole
//! process: the ADS server, the sync driver, the reconcile worker and the
//! cache heartbeat all wait on a [`ShutdownSignal`] cloned from it. Open
//! streams hold an [`OperationGuard`], so [`ShutdownController::shutdown`]
//! can wait for them to drain.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use mesh_server::ShutdownController;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let controller = ShutdownController::new();
//! let signal = controller.shutdown_signal();
//!
//! let worker = tokio::spawn(async move {
//!     signal.wait().await;
//! });
//!
//! assert!(controller.shutdown(Duration::from_secs(1)).await);
//! worker.await.unwrap();
//! # });
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::timeout;
use tracing::{info, warn};

/// Controller for coordinating graceful shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    initiated: AtomicBool,
    tx: watch::Sender<bool>,
    active_ops: AtomicUsize,
    drained: Notify,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(ShutdownInner {
                initiated: AtomicBool::new(false),
                tx,
                active_ops: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.inner.initiated.load(Ordering::SeqCst)
    }

    /// Get a future that resolves when shutdown is initiated.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.inner.tx.subscribe(),
        }
    }

    /// Signal shutdown without waiting for anything to drain.
    ///
    /// Returns `false` if shutdown was already initiated.
    pub fn trigger(&self) -> bool {
        if self
            .inner
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        info!("shutdown initiated");
        self.inner.tx.send_replace(true);
        true
    }

    /// Signal shutdown and wait for registered operations to finish.
    ///
    /// Returns `true` if every operation finished within `grace_period`.
    pub async fn shutdown(&self, grace_period: Duration) -> bool {
        self.trigger();

        match timeout(grace_period, self.wait_for_completion()).await {
            Ok(()) => {
                info!("graceful shutdown completed");
                true
            }
            Err(_) => {
                warn!(
                    remaining_ops = self.active_operations(),
                    "graceful shutdown timed out"
                );
                false
            }
        }
    }

    async fn wait_for_completion(&self) {
        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.active_operations() == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Register an active operation.
    ///
    /// Returns a guard that deregisters it when dropped.
    pub fn register_operation(&self) -> OperationGuard {
        self.inner.active_ops.fetch_add(1, Ordering::SeqCst);
        OperationGuard {
            controller: self.clone(),
        }
    }

    /// Get the number of active operations.
    pub fn active_operations(&self) -> usize {
        self.inner.active_ops.load(Ordering::SeqCst)
    }
}

/// Guard for tracking an active operation.
#[derive(Debug)]
pub struct OperationGuard {
    controller: ShutdownController,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let inner = &self.controller.inner;
        if inner.active_ops.fetch_sub(1, Ordering::SeqCst) == 1 {
            inner.drained.notify_waiters();
        }
    }
}

/// Future source that resolves when shutdown is initiated.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn wait(mut self) {
        // A closed channel means the controller is gone; treat as shutdown.
        let _ = self.rx.wait_for(|initiated| *initiated).await;
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C elsewhere).
///
/// # Errors
///
/// Fails if the signal handlers cannot be installed.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl+C");
    }

    Ok(())
}
