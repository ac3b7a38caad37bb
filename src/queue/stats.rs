//! Queue statistics reported to dashboards

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::task::{Task, TaskId, TaskPriority, TaskStatus};

/// Aggregate view of the queue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatistics {
    /// Tasks submitted since the queue was created
    pub total_tasks: u64,
    pub pending_tasks: usize,
    pub processing_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,
    /// Completed share of finished tasks, as a percentage
    pub success_rate: f64,
    /// Moving average of processing time, in seconds
    pub average_processing_time: f64,
    /// Moving average of time spent pending, in seconds
    pub average_wait_time: f64,
    pub queue_info: QueueInfo,
    pub recent_tasks: Vec<TaskSummary>,
}

/// Shape of the queue itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueInfo {
    pub max_concurrent_tasks: usize,
    pub max_queue_size: usize,
    pub current_queue_size: usize,
    pub workers_running: bool,
}

/// Compact description of one task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub book_id: i64,
    pub status: TaskStatus,
    pub progress: f64,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            book_id: task.target.book_id,
            status: task.status,
            progress: task.progress,
            priority: task.priority,
            created_at: task.created_at,
        }
    }
}
