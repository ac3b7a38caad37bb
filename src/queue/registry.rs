//! Task table plus the pending heap.
//!
//! Every state transition happens through a `TaskRegistry` method, and the
//! owning queue keeps the registry behind one mutex, so checking a task's
//! state and changing it is always a single atomic step. That is what keeps a
//! task from being handed to two workers or cancelled while it runs.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::config::QueueConfig;
use super::error::QueueError;
use super::stats::{QueueInfo, QueueStatistics, TaskSummary};
use super::task::{Task, TaskId, TaskPriority, TaskStatus, TaskTarget};

/// Heap entry for a pending task.
///
/// Ordered so the max-heap yields the lowest priority value first, then the
/// earliest submission. Entries of cancelled tasks stay in the heap and are
/// skipped when popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    priority: TaskPriority,
    seq: u64,
    id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// How a worker finished a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Failed(String),
}

#[derive(Debug, Default)]
struct Counters {
    submitted: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
}

fn ema(current: Option<f64>, sample: f64, alpha: f64) -> f64 {
    match current {
        Some(avg) => alpha * sample + (1.0 - alpha) * avg,
        None => sample,
    }
}

#[derive(Debug)]
pub(crate) struct TaskRegistry {
    config: QueueConfig,
    tasks: HashMap<TaskId, Task>,
    heap: BinaryHeap<QueueEntry>,
    /// Submission order, for recent task summaries
    order: VecDeque<TaskId>,
    next_seq: u64,
    pending: usize,
    processing: usize,
    counters: Counters,
    avg_processing: Option<f64>,
    avg_wait: Option<f64>,
}

impl TaskRegistry {
    pub(crate) fn new(config: QueueConfig) -> Self {
        Self {
            config,
            tasks: HashMap::new(),
            heap: BinaryHeap::new(),
            order: VecDeque::new(),
            next_seq: 0,
            pending: 0,
            processing: 0,
            counters: Counters::default(),
            avg_processing: None,
            avg_wait: None,
        }
    }

    pub(crate) fn submit(
        &mut self,
        target: TaskTarget,
        priority: TaskPriority,
        user_id: String,
        now: DateTime<Utc>,
    ) -> Result<TaskId, QueueError> {
        if self.pending >= self.config.max_queue_size {
            return Err(QueueError::QueueFull {
                capacity: self.config.max_queue_size,
            });
        }

        let task = Task::new(target, priority, user_id, now);
        let id = task.id;
        self.heap.push(QueueEntry {
            priority,
            seq: self.next_seq,
            id,
        });
        self.next_seq += 1;
        self.tasks.insert(id, task);
        self.order.push_back(id);
        self.pending += 1;
        self.counters.submitted += 1;
        Ok(id)
    }

    pub(crate) fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Cancel a pending task; anything else is left untouched
    pub(crate) fn cancel(&mut self, id: &TaskId, now: DateTime<Utc>) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        if task.status != TaskStatus::Pending {
            return false;
        }

        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(now);
        self.pending -= 1;
        self.counters.cancelled += 1;
        true
    }

    /// Move the next pending task to processing and hand out a copy
    pub(crate) fn start_next(&mut self, now: DateTime<Utc>) -> Option<Task> {
        while let Some(entry) = self.heap.pop() {
            let Some(task) = self.tasks.get_mut(&entry.id) else {
                continue;
            };
            if task.status != TaskStatus::Pending {
                continue;
            }

            task.status = TaskStatus::Processing;
            task.started_at = Some(now);
            self.pending -= 1;
            self.processing += 1;

            if let Some(wait) = task.wait_time() {
                self.avg_wait = Some(ema(
                    self.avg_wait,
                    wait.as_secs_f64(),
                    self.config.ema_alpha,
                ));
            }
            return Some(task.clone());
        }
        None
    }

    /// Raise the progress of a processing task. Returns the new value when it
    /// changed; progress never goes down.
    pub(crate) fn advance(&mut self, id: &TaskId, progress: f64) -> Option<f64> {
        let task = self.tasks.get_mut(id)?;
        if task.status != TaskStatus::Processing {
            return None;
        }
        let progress = progress.clamp(0.0, 1.0);
        if progress <= task.progress {
            return None;
        }
        task.progress = progress;
        Some(progress)
    }

    /// Move a processing task to its terminal state.
    ///
    /// Returns `None` if the task is not processing, so a second call for the
    /// same task changes nothing.
    pub(crate) fn finish(
        &mut self,
        id: &TaskId,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Option<Task> {
        let task = self.tasks.get_mut(id)?;
        if task.status != TaskStatus::Processing {
            return None;
        }

        match outcome {
            Outcome::Completed => {
                task.status = TaskStatus::Completed;
                task.progress = 1.0;
                self.counters.completed += 1;
            }
            Outcome::Failed(message) => {
                task.status = TaskStatus::Failed;
                task.error_message = Some(message);
                self.counters.failed += 1;
            }
        }
        task.completed_at = Some(now);
        self.processing -= 1;

        if let Some(elapsed) = task.processing_time() {
            self.avg_processing = Some(ema(
                self.avg_processing,
                elapsed.as_secs_f64(),
                self.config.ema_alpha,
            ));
        }
        Some(task.clone())
    }

    /// Number of pending tasks served before `id`, `None` unless `id` is pending.
    ///
    /// Linear in the heap size.
    pub(crate) fn position(&self, id: &TaskId) -> Option<usize> {
        if self.tasks.get(id)?.status != TaskStatus::Pending {
            return None;
        }
        let own = self.heap.iter().find(|entry| entry.id == *id)?;

        let ahead = self
            .heap
            .iter()
            .filter(|entry| *entry > own)
            .filter(|entry| {
                self.tasks
                    .get(&entry.id)
                    .is_some_and(|task| task.status == TaskStatus::Pending)
            })
            .count();
        Some(ahead)
    }

    /// Expected wait before `id` starts, from its position and the average
    /// processing time. `None` unless `id` is pending.
    pub(crate) fn estimated_wait(&self, id: &TaskId) -> Option<Duration> {
        let position = self.position(id)?;
        let rounds = (position + 1).div_ceil(self.config.max_concurrent_tasks);
        let avg = self.avg_processing.unwrap_or(0.0);
        Some(Duration::from_secs_f64(rounds as f64 * avg))
    }

    /// Drop terminal tasks that finished more than `max_age` before `now`
    pub(crate) fn cleanup(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return 0;
        };

        let before = self.tasks.len();
        self.tasks.retain(|_, task| {
            !(task.status.is_terminal() && task.completed_at.is_some_and(|at| at < cutoff))
        });
        let removed = before - self.tasks.len();

        if removed > 0 {
            let tasks = &self.tasks;
            self.order.retain(|id| tasks.contains_key(id));
            self.heap.retain(|entry| {
                tasks
                    .get(&entry.id)
                    .is_some_and(|task| task.status == TaskStatus::Pending)
            });
        }
        removed
    }

    pub(crate) fn statistics(&self, workers_running: bool) -> QueueStatistics {
        let finished = self.counters.completed + self.counters.failed;
        let success_rate = if finished == 0 {
            0.0
        } else {
            self.counters.completed as f64 / finished as f64 * 100.0
        };

        let recent_tasks = self
            .order
            .iter()
            .rev()
            .take(self.config.recent_tasks_limit)
            .filter_map(|id| self.tasks.get(id))
            .map(TaskSummary::from)
            .collect();

        QueueStatistics {
            total_tasks: self.counters.submitted,
            pending_tasks: self.pending,
            processing_tasks: self.processing,
            completed_tasks: self.counters.completed,
            failed_tasks: self.counters.failed,
            cancelled_tasks: self.counters.cancelled,
            success_rate,
            average_processing_time: self.avg_processing.unwrap_or(0.0),
            average_wait_time: self.avg_wait.unwrap_or(0.0),
            queue_info: QueueInfo {
                max_concurrent_tasks: self.config.max_concurrent_tasks,
                max_queue_size: self.config.max_queue_size,
                current_queue_size: self.pending,
                workers_running,
            },
            recent_tasks,
        }
    }
}
