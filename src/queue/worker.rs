//! Worker pool draining the pending heap

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::progress::ProgressReporter;
use super::registry::Outcome;
use super::task::{Task, TaskStatus};
use super::{QueueState, TaskProcessor};

/// Progress reported when a worker picks up a task
const STARTED_PROGRESS: f64 = 0.1;

/// Handle to a running set of workers.
///
/// Dropping the handle signals shutdown without waiting: each worker finishes
/// the task it is running and then stops, leaving the rest of the backlog
/// pending.
pub(crate) struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn spawn(
        n: usize,
        state: Arc<QueueState>,
        processor: Arc<dyn TaskProcessor>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let state = Arc::clone(&state);
                let processor = Arc::clone(&processor);
                let rx = shutdown_rx.clone();
                tokio::spawn(worker_loop(worker_id, state, processor, rx))
            })
            .collect();

        info!(workers = n, "worker pool started");
        Self { shutdown_tx, joins }
    }

    /// Stop taking new tasks and wait for in-flight tasks to finish
    pub(crate) async fn shutdown_and_join(mut self) {
        // Receivers may already be gone
        let _ = self.shutdown_tx.send(true);
        for join in std::mem::take(&mut self.joins) {
            if let Err(e) = join.await {
                error!(error = %e, "worker exited abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn worker_loop(
    worker_id: usize,
    state: Arc<QueueState>,
    processor: Arc<dyn TaskProcessor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let next = state.registry().start_next(Utc::now());
        let Some(task) = next else {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = state.work_available.notified() => {}
                _ = tokio::time::sleep(state.config.poll_interval) => {}
            }
            continue;
        };

        run_task(worker_id, &state, processor.as_ref(), task).await;
    }

    debug!(worker_id, "worker stopped");
}

#[instrument(
    skip_all,
    fields(worker_id = worker_id, task_id = %task.id, book_id = task.target.book_id)
)]
async fn run_task(
    worker_id: usize,
    state: &Arc<QueueState>,
    processor: &dyn TaskProcessor,
    task: Task,
) {
    info!(priority = %task.priority, "task started");

    let reporter = ProgressReporter::new(Arc::clone(state), task.id);
    reporter.report(STARTED_PROGRESS);

    let result = AssertUnwindSafe(processor.process(&task, &reporter))
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(e)) => {
            warn!(error = %e, "task failed");
            Outcome::Failed(e.to_string())
        }
        Err(_) => {
            error!("task panicked");
            Outcome::Failed("task panicked".to_string())
        }
    };

    let finished = state.registry().finish(&task.id, outcome, Utc::now());
    let Some(finished) = finished else {
        return;
    };

    if finished.status == TaskStatus::Completed {
        state.callbacks.progress(&finished.id, finished.progress);
    }
    info!(
        status = %finished.status,
        elapsed_ms = finished
            .processing_time()
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default(),
        "task finished"
    );
    state.callbacks.completion(&finished);
}
