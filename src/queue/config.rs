//! # Queue Configuration Module
//!
//! - `QueueConfig`: worker count, backlog capacity and bookkeeping knobs
//! - `QueueConfigBuilder`: builder pattern implementation for easier configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_secs;
use crate::error::{Error, Result};

/// Configuration for the task queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of workers, and so the number of tasks processed at once
    pub max_concurrent_tasks: usize,

    /// Maximum number of pending tasks
    pub max_queue_size: usize,

    /// Longest an idle worker sleeps before looking for work again
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Smoothing factor for the moving averages, in `(0, 1]`
    pub ema_alpha: f64,

    /// Number of task summaries reported by `stats()`
    pub recent_tasks_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            max_queue_size: 50,
            poll_interval: Duration::from_secs(1),
            ema_alpha: 0.1,
            recent_tasks_limit: 10,
        }
    }
}

impl QueueConfig {
    /// Create a new builder
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(Error::Config(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(Error::Config("max_queue_size must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll_interval must be positive".to_string()));
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(Error::Config(format!(
                "ema_alpha must be in (0, 1], got {}",
                self.ema_alpha
            )));
        }
        Ok(())
    }
}

/// Builder for QueueConfig
#[derive(Debug, Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
        }
    }

    /// Set the number of workers
    pub fn max_concurrent_tasks(mut self, max_concurrent_tasks: usize) -> Self {
        self.config.max_concurrent_tasks = max_concurrent_tasks;
        self
    }

    /// Set the backlog capacity
    pub fn max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.config.max_queue_size = max_queue_size;
        self
    }

    /// Set the idle poll interval
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    /// Set the moving average smoothing factor
    pub fn ema_alpha(mut self, ema_alpha: f64) -> Self {
        self.config.ema_alpha = ema_alpha;
        self
    }

    /// Set the number of recent task summaries
    pub fn recent_tasks_limit(mut self, recent_tasks_limit: usize) -> Self {
        self.config.recent_tasks_limit = recent_tasks_limit;
        self
    }

    /// Build the configuration
    pub fn build(self) -> QueueConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.max_queue_size, 50);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(QueueConfig::builder().max_concurrent_tasks(0).build().validate().is_err());
        assert!(QueueConfig::builder().max_queue_size(0).build().validate().is_err());
        assert!(QueueConfig::builder().ema_alpha(0.0).build().validate().is_err());
        assert!(QueueConfig::builder().ema_alpha(1.0).build().validate().is_ok());
        assert!(
            QueueConfig::builder()
                .poll_interval(Duration::ZERO)
                .build()
                .validate()
                .is_err()
        );
    }
}
