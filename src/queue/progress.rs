//! Progress reporting and observer callbacks

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use super::QueueState;
use super::task::{Task, TaskId};

/// Called with a task id and its new progress
pub type ProgressCallback = Arc<dyn Fn(&TaskId, f64) + Send + Sync>;

/// Called with the task once it reaches a terminal state
pub type CompletionCallback = Arc<dyn Fn(&Task) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Callbacks {
    progress: RwLock<Vec<ProgressCallback>>,
    completion: RwLock<Vec<CompletionCallback>>,
}

impl Callbacks {
    pub(crate) fn add_progress(&self, callback: ProgressCallback) {
        self.progress
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    pub(crate) fn add_completion(&self, callback: CompletionCallback) {
        self.completion
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    /// Invoke progress observers; a panicking observer is logged and skipped
    pub(crate) fn progress(&self, id: &TaskId, progress: f64) {
        let callbacks = self
            .progress
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(id, progress))).is_err() {
                warn!(task_id = %id, "progress callback panicked");
            }
        }
    }

    /// Invoke completion observers; a panicking observer is logged and skipped
    pub(crate) fn completion(&self, task: &Task) {
        let callbacks = self
            .completion
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(task))).is_err() {
                warn!(task_id = %task.id, "completion callback panicked");
            }
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

/// Handle a processor uses to publish the progress of its task
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    state: Arc<QueueState>,
    task_id: TaskId,
}

impl ProgressReporter {
    pub(crate) fn new(state: Arc<QueueState>, task_id: TaskId) -> Self {
        Self { state, task_id }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Raise the task's progress to `progress` (clamped to `[0, 1]`).
    ///
    /// Lower values than the current progress, and reports for a task that is
    /// no longer processing, are ignored.
    pub fn report(&self, progress: f64) {
        let advanced = self.state.registry().advance(&self.task_id, progress);
        if let Some(progress) = advanced {
            debug!(task_id = %self.task_id, progress, "task progress");
            self.state.callbacks.progress(&self.task_id, progress);
        }
    }
}
