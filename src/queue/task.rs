//! Task identity, priority and lifecycle state

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique task identifier, generated at submission and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Scheduling priority; lower values are served first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Urgent = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskPriority::Urgent => "urgent",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        };
        f.write_str(name)
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "urgent" => Ok(TaskPriority::Urgent),
            "high" => Ok(TaskPriority::High),
            "normal" => Ok(TaskPriority::Normal),
            "low" => Ok(TaskPriority::Low),
            other => Err(format!(
                "unknown priority '{other}', expected urgent, high, normal or low"
            )),
        }
    }
}

/// Lifecycle state of a task.
///
/// `Pending -> Processing -> {Completed, Failed}` or `Pending -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The book a task embeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTarget {
    /// Library id of the book
    pub book_id: i64,

    /// Location of the book file
    pub file_path: PathBuf,

    /// Id of the book's embedding space in the vector store
    pub rag_book_id: String,
}

impl TaskTarget {
    pub fn new(book_id: i64, file_path: impl Into<PathBuf>, rag_book_id: impl Into<String>) -> Self {
        Self {
            book_id,
            file_path: file_path.into(),
            rag_book_id: rag_book_id.into(),
        }
    }
}

/// One embedding job and its current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub target: TaskTarget,
    pub priority: TaskPriority,
    pub user_id: String,
    pub status: TaskStatus,
    /// Fraction done, in `[0.0, 1.0]`
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Task {
    pub(crate) fn new(
        target: TaskTarget,
        priority: TaskPriority,
        user_id: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            target,
            priority,
            user_id,
            status: TaskStatus::Pending,
            progress: 0.0,
            created_at,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Time spent waiting for a worker
    pub fn wait_time(&self) -> Option<Duration> {
        let started = self.started_at?;
        (started - self.created_at).to_std().ok()
    }

    /// Time spent in a worker
    pub fn processing_time(&self) -> Option<Duration> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        (completed - started).to_std().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let mut priorities = vec![
            TaskPriority::Low,
            TaskPriority::Urgent,
            TaskPriority::Normal,
            TaskPriority::High,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                TaskPriority::Urgent,
                TaskPriority::High,
                TaskPriority::Normal,
                TaskPriority::Low
            ]
        );
        assert_eq!(TaskPriority::default(), TaskPriority::Normal);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<TaskPriority>(), Ok(TaskPriority::High));
        assert!("soon".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_ids_are_unique_and_parse() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<TaskId>().unwrap(), a);
    }

    #[test]
    fn test_timings() {
        let created = Utc::now();
        let mut task = Task::new(
            TaskTarget::new(1, "/books/1.txt", "book_1"),
            TaskPriority::Normal,
            "anonymous".to_string(),
            created,
        );
        assert_eq!(task.wait_time(), None);

        task.started_at = Some(created + chrono::Duration::seconds(3));
        task.completed_at = Some(created + chrono::Duration::seconds(10));
        assert_eq!(task.wait_time(), Some(Duration::from_secs(3)));
        assert_eq!(task.processing_time(), Some(Duration::from_secs(7)));

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["priority"], "normal");
    }
}
