//! Queue worker pool
//!
//! N tokio tasks share one durable queue. Each worker claims and processes
//! operations until the queue has nothing due, then waits for a submission
//! notification or the poll interval. Shutdown is cooperative: a worker
//! finishes the operation in hand before observing cancellation.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::retry::RetryController;

pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers
    pub fn spawn(
        controller: Arc<RetryController>,
        worker_count: usize,
        poll_interval: Duration,
        notify: Arc<Notify>,
    ) -> Self {
        let cancel = CancellationToken::new();

        let handles = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&controller),
                    Arc::clone(&notify),
                    poll_interval,
                    cancel.clone(),
                ))
            })
            .collect();

        info!(worker_count, poll_interval_ms = poll_interval.as_millis() as u64, "Worker pool started");

        Self { cancel, handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Token cancelled on shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all workers and wait for them to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        info!("Worker pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    controller: Arc<RetryController>,
    notify: Arc<Notify>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    debug!(worker_id, "Worker started");

    while !cancel.is_cancelled() {
        match controller.process_next().await {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => {
                warn!(worker_id, error = %e, "Failed to process sync operation");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = notify.notified() => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    debug!(worker_id, "Worker stopped");
}
