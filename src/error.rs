//! Error types for the bookrag crate

use thiserror::Error;

/// Result type for bookrag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bookrag operations
#[derive(Debug, Error)]
pub enum Error {
    /// Local budget exhausted or provider throttling outlasted the retries
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// The processing backlog is at capacity
    #[error("Queue full: {capacity} tasks already pending")]
    QueueFull {
        /// Configured backlog capacity
        capacity: usize,
    },

    /// Lookup on an unknown task id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A remote call did not answer before its timeout
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A remote call to the model provider failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Document processing error
    #[error("Process error: {0}")]
    Process(String),

    /// Search error
    #[error("Search error: {0}")]
    Search(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller should treat this as "system busy, please wait"
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::RateLimited(_) | Error::QueueFull { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_errors() {
        assert!(Error::RateLimited("per-minute".to_string()).is_busy());
        assert!(Error::QueueFull { capacity: 3 }.is_busy());
        assert!(!Error::Provider("bad payload".to_string()).is_busy());
        assert!(!Error::TaskNotFound("x".to_string()).is_busy());
    }
}
