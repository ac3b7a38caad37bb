//! # Rate Limiter Configuration Module
//!
//! Configuration for one category of remote calls. Generation calls and
//! embedding calls have different provider-side quotas, so each gets its own
//! `LimiterConfig` and its own `RateLimiter` instance.
//!
//! ## Key Components
//!
//! - `LimiterConfig`: concurrency cap, sliding-window budgets and retry policy
//! - `LimiterConfigBuilder`: builder pattern implementation for easier configuration
//!
//! ## Presets
//!
//! - `LimiterConfig::generation()`: text generation against the free tier
//! - `LimiterConfig::embedding()`: cheaper, more frequent embedding calls

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_secs;
use crate::error::{Error, Result};

/// Configuration for a rate limiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Maximum number of calls in flight at once
    pub max_concurrent_calls: usize,

    /// Maximum number of calls admitted in any 60 second window
    pub max_calls_per_minute: usize,

    /// Maximum number of calls admitted in any 3600 second window
    pub max_calls_per_hour: usize,

    /// Base delay before retrying after a rate-limit signal
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,

    /// Number of retries after the first attempt
    pub max_retries: u32,

    /// Growth factor applied to `retry_delay` on each retry
    pub backoff_multiplier: f64,

    /// Upper bound for a single backoff sleep
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,

    /// Timeout for one invocation of the wrapped call
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,

    /// Longest local-budget wait worth sleeping through
    #[serde(with = "duration_secs")]
    pub max_admission_wait: Duration,

    /// Consecutive failed attempts after which the limiter reports unhealthy
    pub unhealthy_after: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 2,
            max_calls_per_minute: 30,
            max_calls_per_hour: 1000,
            retry_delay: Duration::from_secs(1),
            max_retries: 3,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
            max_admission_wait: Duration::from_secs(300),
            unhealthy_after: 5,
        }
    }
}

impl LimiterConfig {
    /// Create a new builder
    pub fn builder() -> LimiterConfigBuilder {
        LimiterConfigBuilder::new()
    }

    /// Budget for text generation calls
    pub fn generation() -> Self {
        Self {
            max_concurrent_calls: 5,
            max_calls_per_minute: 15,
            max_calls_per_hour: 300,
            retry_delay: Duration::from_secs(1),
            max_retries: 3,
            backoff_multiplier: 1.5,
            ..Self::default()
        }
    }

    /// Budget for embedding calls
    pub fn embedding() -> Self {
        Self {
            max_concurrent_calls: 5,
            max_calls_per_minute: 30,
            max_calls_per_hour: 1000,
            retry_delay: Duration::from_millis(500),
            max_retries: 5,
            backoff_multiplier: 1.2,
            ..Self::default()
        }
    }

    /// Reject values that would deadlock or disable the limiter
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_calls == 0 {
            return Err(Error::Config(
                "max_concurrent_calls must be at least 1".to_string(),
            ));
        }
        if self.max_calls_per_minute == 0 || self.max_calls_per_hour == 0 {
            return Err(Error::Config(
                "per-minute and per-hour budgets must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::Config("call_timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Backoff before retry number `attempt + 1`, capped at `max_backoff`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.retry_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Builder for LimiterConfig
#[derive(Debug, Default)]
pub struct LimiterConfigBuilder {
    config: LimiterConfig,
}

impl LimiterConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LimiterConfig::default(),
        }
    }

    /// Set the concurrency cap
    pub fn max_concurrent_calls(mut self, max_concurrent_calls: usize) -> Self {
        self.config.max_concurrent_calls = max_concurrent_calls;
        self
    }

    /// Set the per-minute budget
    pub fn max_calls_per_minute(mut self, max_calls_per_minute: usize) -> Self {
        self.config.max_calls_per_minute = max_calls_per_minute;
        self
    }

    /// Set the per-hour budget
    pub fn max_calls_per_hour(mut self, max_calls_per_hour: usize) -> Self {
        self.config.max_calls_per_hour = max_calls_per_hour;
        self
    }

    /// Set the base retry delay
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.config.retry_delay = retry_delay;
        self
    }

    /// Set the number of retries
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Set the backoff multiplier
    pub fn backoff_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.config.backoff_multiplier = backoff_multiplier;
        self
    }

    /// Set the backoff cap
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.config.max_backoff = max_backoff;
        self
    }

    /// Set the per-call timeout
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.config.call_timeout = call_timeout;
        self
    }

    /// Set the longest admission wait
    pub fn max_admission_wait(mut self, max_admission_wait: Duration) -> Self {
        self.config.max_admission_wait = max_admission_wait;
        self
    }

    /// Set the unhealthy threshold
    pub fn unhealthy_after(mut self, unhealthy_after: u32) -> Self {
        self.config.unhealthy_after = unhealthy_after;
        self
    }

    /// Build the configuration
    pub fn build(self) -> LimiterConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = LimiterConfig::builder()
            .max_concurrent_calls(4)
            .max_calls_per_minute(10)
            .max_calls_per_hour(100)
            .retry_delay(Duration::from_millis(250))
            .max_retries(2)
            .backoff_multiplier(3.0)
            .build();

        assert_eq!(config.max_concurrent_calls, 4);
        assert_eq!(config.max_calls_per_minute, 10);
        assert_eq!(config.max_calls_per_hour, 100);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff_multiplier, 3.0);
    }

    #[test]
    fn test_presets_differ() {
        let generation = LimiterConfig::generation();
        let embedding = LimiterConfig::embedding();

        assert_eq!(generation.max_calls_per_minute, 15);
        assert_eq!(embedding.max_calls_per_minute, 30);
        assert!(embedding.max_retries > generation.max_retries);
        assert!(generation.validate().is_ok());
        assert!(embedding.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_caps() {
        let config = LimiterConfig::builder().max_concurrent_calls(0).build();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = LimiterConfig::builder().max_calls_per_hour(0).build();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = LimiterConfig::builder().backoff_multiplier(0.5).build();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = LimiterConfig::builder()
            .retry_delay(Duration::from_secs(1))
            .backoff_multiplier(2.0)
            .max_backoff(Duration::from_secs(10))
            .build();

        assert_eq!(config.backoff_for(0), Duration::from_secs(1));
        assert_eq!(config.backoff_for(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for(3), Duration::from_secs(8));
        assert_eq!(config.backoff_for(4), Duration::from_secs(10));
        assert_eq!(config.backoff_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: LimiterConfig =
            serde_json::from_str(r#"{"max_calls_per_minute": 5, "retry_delay": 0.25}"#).unwrap();

        assert_eq!(config.max_calls_per_minute, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.max_concurrent_calls, 2);
    }
}
