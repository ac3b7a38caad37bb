//! Error types for the queue module

use thiserror::Error;

use super::task::TaskId;
use crate::error::Error as CrateError;

/// Error type for queue operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The backlog already holds `capacity` pending tasks
    #[error("queue is full ({capacity} pending tasks)")]
    QueueFull { capacity: usize },

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

impl From<QueueError> for CrateError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::QueueFull { capacity } => CrateError::QueueFull { capacity },
            QueueError::TaskNotFound(id) => CrateError::TaskNotFound(id.to_string()),
        }
    }
}
