//! # Task Queue Module
//!
//! A priority queue of embedding tasks in front of a fixed pool of workers.
//!
//! ## Key Components
//!
//! - `TaskQueue`: submission, status, cancellation and statistics
//! - `TaskProcessor`: the work a worker runs for each task
//! - `ProgressReporter`: how a processor publishes progress
//! - `QueueConfig`: worker count, capacity and polling
//!
//! ## Ordering
//!
//! Tasks are served by priority (`Urgent` first), then in submission order.
//! A running task is never preempted and only pending tasks can be cancelled.
//!
//! ## Lifecycle
//!
//! Workers run between `start()` and `shutdown()`. Tasks may be submitted at
//! any time; they wait as `Pending` until a worker is available.

mod config;
mod error;
mod progress;
mod registry;
mod stats;
mod task;
mod worker;

pub use config::{QueueConfig, QueueConfigBuilder};
pub use error::QueueError;
pub use progress::{CompletionCallback, ProgressCallback, ProgressReporter};
pub use stats::{QueueInfo, QueueStatistics, TaskSummary};
pub use task::{Task, TaskId, TaskPriority, TaskStatus, TaskTarget};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

use crate::error::Result;
use progress::Callbacks;
use registry::TaskRegistry;
use worker::WorkerPool;

/// Work performed by a worker for one task.
///
/// Returning an error marks the task `Failed` with the error's message; so
/// does a panic.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: &Task, progress: &ProgressReporter) -> Result<()>;
}

/// State shared by the queue handle and its workers
#[derive(Debug)]
pub(crate) struct QueueState {
    config: QueueConfig,
    registry: Mutex<TaskRegistry>,
    callbacks: Callbacks,
    work_available: Notify,
}

impl QueueState {
    fn registry(&self) -> MutexGuard<'_, TaskRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Priority task queue with a worker pool
pub struct TaskQueue {
    state: Arc<QueueState>,
    processor: Arc<dyn TaskProcessor>,
    workers: Mutex<Option<WorkerPool>>,
}

impl TaskQueue {
    pub fn new(config: QueueConfig, processor: Arc<dyn TaskProcessor>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(QueueState {
                registry: Mutex::new(TaskRegistry::new(config.clone())),
                config,
                callbacks: Callbacks::default(),
                work_available: Notify::new(),
            }),
            processor,
            workers: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.state.config
    }

    fn workers(&self) -> MutexGuard<'_, Option<WorkerPool>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut workers = self.workers();
        if workers.is_some() {
            warn!("task queue already started");
            return;
        }
        *workers = Some(WorkerPool::spawn(
            self.state.config.max_concurrent_tasks,
            Arc::clone(&self.state),
            Arc::clone(&self.processor),
        ));
    }

    /// Stop the workers after their current tasks finish
    pub async fn shutdown(&self) {
        let pool = self.workers().take();
        if let Some(pool) = pool {
            pool.shutdown_and_join().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.workers().is_some()
    }

    /// Enqueue a task and return its id without waiting for it to run
    #[instrument(skip(self, target), fields(book_id = target.book_id))]
    pub fn submit(
        &self,
        target: TaskTarget,
        priority: TaskPriority,
        user_id: impl Into<String> + std::fmt::Debug,
    ) -> std::result::Result<TaskId, QueueError> {
        let submitted = self
            .state
            .registry()
            .submit(target, priority, user_id.into(), Utc::now());

        match &submitted {
            Ok(id) => {
                info!(task_id = %id, %priority, "task submitted");
                self.state.work_available.notify_one();
            }
            Err(e) => warn!(error = %e, "task rejected"),
        }
        submitted
    }

    /// Current copy of a task
    pub fn get_status(&self, id: &TaskId) -> std::result::Result<Task, QueueError> {
        self.state
            .registry()
            .get(id)
            .cloned()
            .ok_or(QueueError::TaskNotFound(*id))
    }

    /// Cancel a pending task. Returns false for unknown tasks and for tasks
    /// already picked up by a worker.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let cancelled = self.state.registry().cancel(id, Utc::now());
        if cancelled {
            info!(task_id = %id, "task cancelled");
        }
        cancelled
    }

    /// Number of pending tasks that will be served before `id`; `None` unless
    /// `id` is pending
    pub fn queue_position(&self, id: &TaskId) -> Option<usize> {
        self.state.registry().position(id)
    }

    /// Expected time until `id` starts; `None` unless `id` is pending
    pub fn estimated_wait(&self, id: &TaskId) -> Option<Duration> {
        self.state.registry().estimated_wait(id)
    }

    pub fn stats(&self) -> QueueStatistics {
        let running = self.is_running();
        self.state.registry().statistics(running)
    }

    /// Evict finished tasks older than `max_age`, returning how many went
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let removed = self.state.registry().cleanup(max_age, Utc::now());
        if removed > 0 {
            info!(removed, "cleaned up finished tasks");
        }
        removed
    }

    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(&TaskId, f64) + Send + Sync + 'static,
    {
        self.state.callbacks.add_progress(Arc::new(callback));
    }

    pub fn on_completion<F>(&self, callback: F)
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        self.state.callbacks.add_completion(Arc::new(callback));
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("config", &self.state.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
