//! Sliding-window call budget and call statistics.
//!
//! A `CallBudget` keeps the timestamps of admitted calls in two windows, one
//! for the last minute and one for the last hour. Entries are pruned lazily
//! before every check, so a window only ever holds timestamps younger than its
//! period.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Length of the short window
pub const MINUTE: Duration = Duration::from_secs(60);

/// Length of the long window
pub const HOUR: Duration = Duration::from_secs(3600);

/// Why a call was refused or abandoned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitReason {
    /// The local per-minute budget is used up
    MinuteBudget {
        /// Time until the oldest entry leaves the window
        wait: Duration,
    },
    /// The local per-hour budget is used up
    HourBudget {
        /// Time until the oldest entry leaves the window
        wait: Duration,
    },
    /// The provider kept signaling throttling until the retries ran out
    Provider {
        /// Number of attempts made
        attempts: u32,
        /// Text of the last provider error
        message: String,
    },
}

impl RateLimitReason {
    /// Suggested wait before the budget frees a slot, if this is a local denial
    pub fn wait(&self) -> Option<Duration> {
        match self {
            Self::MinuteBudget { wait } | Self::HourBudget { wait } => Some(*wait),
            Self::Provider { .. } => None,
        }
    }
}

impl fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinuteBudget { wait } => write!(
                f,
                "per-minute budget reached, wait {:.1}s",
                wait.as_secs_f64()
            ),
            Self::HourBudget { wait } => {
                let secs = wait.as_secs();
                write!(
                    f,
                    "per-hour budget reached, wait {}m {}s",
                    secs / 60,
                    secs % 60
                )
            }
            Self::Provider { attempts, message } => write!(
                f,
                "provider signaled rate limit after {attempts} attempts: {message}"
            ),
        }
    }
}

/// Answer of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied(RateLimitReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    /// Human readable reason, "OK" when admitted
    pub fn reason(&self) -> String {
        match self {
            Admission::Admitted => "OK".to_string(),
            Admission::Denied(reason) => reason.to_string(),
        }
    }
}

/// Counters kept by one limiter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStatistics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rate_limited_calls: u64,
    /// Cumulative mean of attempt durations, in seconds
    pub average_response_time: f64,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl CallStatistics {
    /// Percentage of attempts that succeeded
    pub fn success_rate(&self) -> f64 {
        self.successful_calls as f64 / self.total_calls.max(1) as f64 * 100.0
    }
}

/// Health derived from recent attempts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    /// Consecutive failed attempts since the last success
    pub error_count: u32,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Sliding windows plus statistics for one limiter.
///
/// Not synchronized; the owning limiter keeps it behind a single mutex.
#[derive(Debug)]
pub struct CallBudget {
    per_minute: usize,
    per_hour: usize,
    unhealthy_after: u32,
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    stats: CallStatistics,
    consecutive_errors: u32,
    last_error_at: Option<DateTime<Utc>>,
}

impl CallBudget {
    pub fn new(per_minute: usize, per_hour: usize, unhealthy_after: u32) -> Self {
        Self {
            per_minute,
            per_hour,
            unhealthy_after,
            minute: VecDeque::with_capacity(per_minute),
            hour: VecDeque::new(),
            stats: CallStatistics::default(),
            consecutive_errors: 0,
            last_error_at: None,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.minute.front() {
            if now.saturating_duration_since(*oldest) >= MINUTE {
                self.minute.pop_front();
            } else {
                break;
            }
        }
        while let Some(oldest) = self.hour.front() {
            if now.saturating_duration_since(*oldest) >= HOUR {
                self.hour.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether a call could be admitted at `now`, without reserving it
    pub fn can_admit(&mut self, now: Instant) -> Admission {
        self.prune(now);

        if self.minute.len() >= self.per_minute {
            let wait = self
                .minute
                .front()
                .map(|oldest| MINUTE.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or_default();
            return Admission::Denied(RateLimitReason::MinuteBudget { wait });
        }

        if self.hour.len() >= self.per_hour {
            let wait = self
                .hour
                .front()
                .map(|oldest| HOUR.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or_default();
            return Admission::Denied(RateLimitReason::HourBudget { wait });
        }

        Admission::Admitted
    }

    /// Check and, when admitted, reserve the call in both windows.
    ///
    /// Reservation happens under the same lock as the check so concurrent
    /// callers can never push a window past its cap.
    pub fn try_admit(&mut self, now: Instant) -> Admission {
        let admission = self.can_admit(now);
        if admission.is_admitted() {
            self.minute.push_back(now);
            self.hour.push_back(now);
        }
        admission
    }

    /// Record the outcome of one attempt
    pub fn record(&mut self, success: bool, duration: Duration) {
        self.stats.total_calls += 1;
        self.stats.last_call_at = Some(Utc::now());

        if success {
            self.stats.successful_calls += 1;
            self.consecutive_errors = 0;
        } else {
            self.stats.failed_calls += 1;
            self.consecutive_errors = self.consecutive_errors.saturating_add(1);
            self.last_error_at = self.stats.last_call_at;
        }

        let sample = duration.as_secs_f64();
        let avg = self.stats.average_response_time;
        self.stats.average_response_time = avg + (sample - avg) / self.stats.total_calls as f64;
    }

    /// Count a failed attempt that carried a provider rate-limit signal
    pub fn record_rate_limited(&mut self) {
        self.stats.rate_limited_calls += 1;
    }

    pub fn statistics(&self) -> &CallStatistics {
        &self.stats
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            is_healthy: self.consecutive_errors < self.unhealthy_after,
            error_count: self.consecutive_errors,
            last_error_at: self.last_error_at,
        }
    }

    /// Window sizes after pruning: (minute, hour)
    pub fn usage(&mut self, now: Instant) -> (usize, usize) {
        self.prune(now);
        (self.minute.len(), self.hour.len())
    }

    /// Clear windows, statistics and health
    pub fn reset(&mut self) {
        self.minute.clear();
        self.hour.clear();
        self.stats = CallStatistics::default();
        self.consecutive_errors = 0;
        self.last_error_at = None;
    }
}
