//! Coalescing reconcile trigger queue and its worker.
//!
//! Cluster events and the periodic resync both feed namespaces into one
//! [`ReconcileQueue`]. A namespace that is already waiting is not queued
//! again, so a burst of events costs one reconcile. The
//! [`ReconcileWorker`] pops namespaces in order and runs
//! [`Reconciler::reconcile`] for each, re-enqueuing failures after a delay.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use metrics::gauge;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace};

use crate::reconciler::{ReconcileOutcome, Reconciler};

/// Namespace whose events are never reconciled.
pub const IGNORED_NAMESPACE: &str = "kube-system";

/// Producer handle of the reconcile queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReconcileQueue {
    tx: mpsc::UnboundedSender<String>,
    queued: Arc<DashSet<String>>,
    ignored: Arc<HashSet<String>>,
}

/// Consumer half of the reconcile queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<String>,
    queued: Arc<DashSet<String>>,
}

impl ReconcileQueue {
    /// Create a queue that ignores [`IGNORED_NAMESPACE`].
    pub fn new() -> (Self, QueueReceiver) {
        Self::with_ignored([IGNORED_NAMESPACE])
    }

    /// Create a queue that ignores the given namespaces.
    pub fn with_ignored<I, S>(ignored: I) -> (Self, QueueReceiver)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(DashSet::new());
        let queue = Self {
            tx,
            queued: Arc::clone(&queued),
            ignored: Arc::new(ignored.into_iter().map(Into::into).collect()),
        };
        (queue, QueueReceiver { rx, queued })
    }

    /// Queue a namespace for reconciliation.
    ///
    /// Returns `false` when the namespace is ignored, already queued, or
    /// the worker is gone.
    pub fn enqueue(&self, namespace: impl Into<String>) -> bool {
        let namespace = namespace.into();
        if self.ignored.contains(&namespace) {
            trace!(namespace, "ignoring event for excluded namespace");
            return false;
        }
        if !self.queued.insert(namespace.clone()) {
            trace!(namespace, "namespace already queued");
            return false;
        }
        match self.tx.send(namespace) {
            Ok(()) => {
                gauge!("meshplane_reconcile_queue_depth").set(self.queued.len() as f64);
                true
            }
            Err(mpsc::error::SendError(namespace)) => {
                self.queued.remove(&namespace);
                false
            }
        }
    }

    /// Number of namespaces waiting.
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    /// Whether no namespace is waiting.
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}

impl QueueReceiver {
    /// Wait for the next namespace.
    ///
    /// The namespace leaves the dedupe set before it is returned, so an
    /// event arriving while it is being reconciled queues it again.
    pub async fn pop(&mut self) -> Option<String> {
        let namespace = self.rx.recv().await?;
        self.queued.remove(&namespace);
        Some(namespace)
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Namespaces enqueued at start and on every resync.
    pub namespaces: Vec<String>,
    /// Interval between full resyncs.
    pub resync_interval: Duration,
    /// Delay before a failed namespace is queued again.
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            namespaces: vec!["default".to_string()],
            resync_interval: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Drains a [`ReconcileQueue`] into a [`Reconciler`].
#[derive(Debug)]
pub struct ReconcileWorker {
    reconciler: Arc<Reconciler>,
    queue: ReconcileQueue,
    receiver: QueueReceiver,
    config: WorkerConfig,
    on_updated: Option<Arc<Notify>>,
}

impl ReconcileWorker {
    /// Create a worker.
    pub fn new(
        reconciler: Arc<Reconciler>,
        queue: ReconcileQueue,
        receiver: QueueReceiver,
        config: WorkerConfig,
    ) -> Self {
        Self {
            reconciler,
            queue,
            receiver,
            config,
            on_updated: None,
        }
    }

    /// Signal `notify` after every reconcile that wrote a new list.
    #[must_use]
    pub fn wake_on_update(mut self, notify: Arc<Notify>) -> Self {
        self.on_updated = Some(notify);
        self
    }

    /// Run until `shutdown` resolves.
    ///
    /// Shutdown is only observed between reconciles, so a store write is
    /// never abandoned halfway.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut resync = tokio::time::interval(self.config.resync_interval);
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(namespaces = ?self.config.namespaces, "reconcile worker started");
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = resync.tick() => {
                    for namespace in &self.config.namespaces {
                        self.queue.enqueue(namespace.as_str());
                    }
                }
                next = self.receiver.pop() => match next {
                    Some(namespace) => self.process(namespace).await,
                    None => break,
                },
            }
        }
        info!("reconcile worker stopped");
    }

    async fn process(&self, namespace: String) {
        match self.reconciler.reconcile(&namespace).await {
            Ok(ReconcileOutcome::Updated) => {
                if let Some(notify) = &self.on_updated {
                    notify.notify_one();
                }
            }
            Ok(ReconcileOutcome::Unchanged) => {}
            Err(e) => {
                error!(namespace, error = %e, "reconcile failed, retrying later");
                let queue = self.queue.clone();
                let delay = self.config.retry_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    debug!(namespace, "re-enqueueing failed namespace");
                    queue.enqueue(namespace);
                });
            }
        }
    }
}
