//! Retry bookkeeping shared by the async and blocking call paths.
//!
//! Both adapters drive the same loop: ask for admission, take a slot, invoke,
//! settle the outcome. The decisions about whether to sleep, for how long and
//! when to give up live here so the two adapters only differ in how they wait.

use std::time::Duration;

use super::budget::RateLimitReason;
use super::config::LimiterConfig;
use super::error::LimiterError;

/// What the call loop should do next
#[derive(Debug)]
pub(crate) enum Step<T, E> {
    /// Sleep, then start the next attempt
    Retry(Duration),
    /// Stop and hand this back to the caller
    Done(Result<T, LimiterError<E>>),
}

/// How one invocation of the wrapped call ended
#[derive(Debug)]
pub(crate) enum CallOutcome<T, E> {
    Completed(Result<T, E>),
    TimedOut(Duration),
    Aborted(String),
}

/// Attempt counter for one `execute` call.
///
/// Admission denials and provider rate-limit signals both consume attempts;
/// together they are bounded by `max_retries + 1`.
#[derive(Debug)]
pub(crate) struct Attempts<'a> {
    config: &'a LimiterConfig,
    attempt: u32,
}

impl<'a> Attempts<'a> {
    pub(crate) fn new(config: &'a LimiterConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// One-based number of the current attempt
    pub(crate) fn number(&self) -> u32 {
        self.attempt + 1
    }

    fn exhausted(&self) -> bool {
        self.attempt >= self.config.max_retries
    }

    /// The local budget refused the current attempt
    pub(crate) fn on_denied<T, E>(&mut self, reason: RateLimitReason) -> Step<T, E> {
        let wait = match reason.wait() {
            Some(wait) if !wait.is_zero() => wait,
            _ => self.config.retry_delay,
        };

        if self.exhausted() || wait > self.config.max_admission_wait {
            return Step::Done(Err(LimiterError::RateLimitExceeded(reason)));
        }

        self.attempt += 1;
        Step::Retry(wait)
    }

    /// The provider signaled throttling on the current attempt
    pub(crate) fn on_rate_limited<T, E>(&mut self, message: String) -> Step<T, E> {
        if self.exhausted() {
            return Step::Done(Err(LimiterError::RateLimitExceeded(
                RateLimitReason::Provider {
                    attempts: self.number(),
                    message,
                },
            )));
        }

        let delay = self.config.backoff_for(self.attempt);
        self.attempt += 1;
        Step::Retry(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_retries: u32) -> LimiterConfig {
        LimiterConfig::builder()
            .max_retries(max_retries)
            .retry_delay(Duration::from_secs(1))
            .backoff_multiplier(2.0)
            .max_admission_wait(Duration::from_secs(120))
            .build()
    }

    #[test]
    fn test_provider_backoff_sequence() {
        let config = config(3);
        let mut attempts = Attempts::new(&config);
        let mut delays = Vec::new();

        loop {
            match attempts.on_rate_limited::<(), ()>("429".to_string()) {
                Step::Retry(delay) => delays.push(delay),
                Step::Done(result) => {
                    assert!(matches!(
                        result,
                        Err(LimiterError::RateLimitExceeded(RateLimitReason::Provider {
                            attempts: 4,
                            ..
                        }))
                    ));
                    break;
                }
            }
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn test_denial_uses_suggested_wait() {
        let config = config(1);
        let mut attempts = Attempts::new(&config);
        let reason = RateLimitReason::MinuteBudget {
            wait: Duration::from_secs(42),
        };

        assert!(matches!(
            attempts.on_denied::<(), ()>(reason.clone()),
            Step::Retry(wait) if wait == Duration::from_secs(42)
        ));
        assert!(matches!(
            attempts.on_denied::<(), ()>(reason),
            Step::Done(Err(LimiterError::RateLimitExceeded(_)))
        ));
    }

    #[test]
    fn test_denial_without_estimate_uses_retry_delay() {
        let config = config(2);
        let mut attempts = Attempts::new(&config);
        let reason = RateLimitReason::MinuteBudget {
            wait: Duration::ZERO,
        };

        assert!(matches!(
            attempts.on_denied::<(), ()>(reason),
            Step::Retry(wait) if wait == Duration::from_secs(1)
        ));
    }

    #[test]
    fn test_denial_longer_than_cap_fails_fast() {
        let config = config(5);
        let mut attempts = Attempts::new(&config);
        let reason = RateLimitReason::HourBudget {
            wait: Duration::from_secs(1800),
        };

        assert!(matches!(
            attempts.on_denied::<(), ()>(reason),
            Step::Done(Err(LimiterError::RateLimitExceeded(
                RateLimitReason::HourBudget { .. }
            )))
        ));
        assert_eq!(attempts.number(), 1);
    }
}
