//! # Rate Limiter Module
//!
//! The single gateway for calls to the remote AI provider. A `RateLimiter`
//! combines three controls:
//!
//! - a concurrency cap (a semaphore sized to `max_concurrent_calls`)
//! - a call budget over sliding minute and hour windows
//! - exponential backoff when the provider signals throttling
//!
//! ## Call Flow
//!
//! 1. Ask the budget for admission; when denied, sleep the suggested wait
//! 2. Acquire a concurrency slot
//! 3. Invoke the wrapped call under a timeout
//! 4. On a rate-limit signal, back off and retry; other errors return as-is
//!
//! Both [`RateLimiter::execute`] (async) and [`RateLimiter::execute_blocking`]
//! (thread-blocking) share one retry core and one semaphore, so their calls
//! count against the same caps.

mod budget;
mod classify;
mod config;
mod error;
mod registry;
mod retry;

pub use budget::{
    Admission, CallBudget, CallStatistics, HealthStatus, RateLimitReason, HOUR, MINUTE,
};
pub use classify::{
    is_rate_limit_error, RateLimitPolicy, DEFAULT_RATE_LIMIT_KEYWORDS, STRICT_RATE_LIMIT_KEYWORDS,
};
pub use config::{LimiterConfig, LimiterConfigBuilder};
pub use error::LimiterError;
pub use registry::{LimiterRegistry, EMBEDDING, GENERATION};

use std::fmt::Display;
use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use retry::{Attempts, CallOutcome, Step};

/// Calls in flight and window usage at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentUsage {
    pub calls_this_minute: usize,
    pub calls_this_hour: usize,
    pub concurrent_calls: usize,
}

/// Statistics plus the derived success rate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    #[serde(flatten)]
    pub counters: CallStatistics,
    pub success_rate: f64,
}

/// Point-in-time view of one limiter, for dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimiterSnapshot {
    pub name: String,
    pub config: LimiterConfig,
    pub current_usage: CurrentUsage,
    pub statistics: StatisticsSnapshot,
    pub health: HealthStatus,
}

/// Rate limiter for one category of remote calls
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    config: LimiterConfig,
    policy: RateLimitPolicy,
    slots: Arc<Semaphore>,
    budget: Mutex<CallBudget>,
}

impl RateLimiter {
    /// Create a limiter with the default classification policy
    pub fn new(name: impl Into<String>, config: LimiterConfig) -> Result<Self> {
        Self::with_policy(name, config, RateLimitPolicy::default())
    }

    pub fn with_policy(
        name: impl Into<String>,
        config: LimiterConfig,
        policy: RateLimitPolicy,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        debug!(
            limiter = %name,
            max_concurrent = config.max_concurrent_calls,
            per_minute = config.max_calls_per_minute,
            per_hour = config.max_calls_per_hour,
            "rate limiter initialized"
        );
        Ok(Self {
            slots: Arc::new(Semaphore::new(config.max_concurrent_calls)),
            budget: Mutex::new(CallBudget::new(
                config.max_calls_per_minute,
                config.max_calls_per_hour,
                config.unhealthy_after,
            )),
            name,
            config,
            policy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn budget(&self) -> MutexGuard<'_, CallBudget> {
        self.budget.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a call would be admitted right now, without reserving it
    pub fn can_admit(&self) -> Admission {
        self.budget().can_admit(Instant::now())
    }

    /// Run `call` under the concurrency cap, the call budget and the retry policy.
    ///
    /// `call` is invoked once per attempt. Errors the policy does not classify
    /// as rate-limit signals are returned on the first occurrence as
    /// [`LimiterError::Call`].
    #[instrument(skip(self, call), fields(limiter = %self.name))]
    pub async fn execute<F, Fut, T, E>(&self, mut call: F) -> std::result::Result<T, LimiterError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let mut attempts = Attempts::new(&self.config);

        loop {
            if let Some(step) = self.admit(&mut attempts) {
                match step {
                    Step::Retry(wait) => {
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    Step::Done(result) => return result,
                }
            }

            let permit = match self.slots.acquire().await {
                Ok(permit) => permit,
                Err(_) => return Err(LimiterError::Aborted("limiter closed".to_string())),
            };

            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.config.call_timeout, call()).await {
                Ok(result) => CallOutcome::Completed(result),
                Err(_) => CallOutcome::TimedOut(self.config.call_timeout),
            };
            drop(permit);

            match self.settle(&mut attempts, outcome, started.elapsed()) {
                Step::Retry(delay) => tokio::time::sleep(delay).await,
                Step::Done(result) => return result,
            }
        }
    }

    /// Thread-blocking variant of [`execute`](Self::execute).
    ///
    /// Each attempt runs `call` on a helper thread so the timeout can be
    /// enforced; a timed-out attempt is abandoned, not killed, and keeps its
    /// concurrency slot until the call returns. Do not call this from inside
    /// an async task; use `spawn_blocking`.
    pub fn execute_blocking<F, T, E>(&self, call: F) -> std::result::Result<T, LimiterError<E>>
    where
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let call = Arc::new(call);
        let mut attempts = Attempts::new(&self.config);

        loop {
            if let Some(step) = self.admit(&mut attempts) {
                match step {
                    Step::Retry(wait) => {
                        std::thread::sleep(wait);
                        continue;
                    }
                    Step::Done(result) => return result,
                }
            }

            let slot = Arc::clone(&self.slots).acquire_owned();
            let permit = match futures::executor::block_on(slot) {
                Ok(permit) => permit,
                Err(_) => return Err(LimiterError::Aborted("limiter closed".to_string())),
            };

            let started = Instant::now();
            let outcome = self.invoke_on_thread(Arc::clone(&call), permit);

            match self.settle(&mut attempts, outcome, started.elapsed()) {
                Step::Retry(delay) => std::thread::sleep(delay),
                Step::Done(result) => return result,
            }
        }
    }

    /// Run one attempt on a helper thread that owns `permit` until `call`
    /// returns, even when the attempt times out first
    fn invoke_on_thread<F, T, E>(
        &self,
        call: Arc<F>,
        permit: OwnedSemaphorePermit,
    ) -> CallOutcome<T, E>
    where
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let spawned = std::thread::Builder::new()
            .name(format!("{}-call", self.name))
            .spawn(move || {
                let result = (*call)();
                drop(permit);
                // The receiver is gone if the attempt already timed out
                let _ = tx.send(result);
            });

        if let Err(e) = spawned {
            return CallOutcome::Aborted(format!("failed to start call thread: {e}"));
        }

        match rx.recv_timeout(self.config.call_timeout) {
            Ok(result) => CallOutcome::Completed(result),
            Err(RecvTimeoutError::Timeout) => CallOutcome::TimedOut(self.config.call_timeout),
            Err(RecvTimeoutError::Disconnected) => {
                CallOutcome::Aborted("call panicked".to_string())
            }
        }
    }

    /// Admission for the current attempt; `None` lets the call proceed
    fn admit<T, E>(&self, attempts: &mut Attempts<'_>) -> Option<Step<T, E>> {
        let admission = self.budget().try_admit(Instant::now());
        match admission {
            Admission::Admitted => None,
            Admission::Denied(reason) => {
                warn!(
                    limiter = %self.name,
                    attempt = attempts.number(),
                    %reason,
                    "call not admitted"
                );
                Some(attempts.on_denied(reason))
            }
        }
    }

    /// Record the outcome of an attempt and decide what happens next
    fn settle<T, E: Display>(
        &self,
        attempts: &mut Attempts<'_>,
        outcome: CallOutcome<T, E>,
        elapsed: Duration,
    ) -> Step<T, E> {
        match outcome {
            CallOutcome::Completed(Ok(value)) => {
                self.budget().record(true, elapsed);
                info!(
                    limiter = %self.name,
                    attempt = attempts.number(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "call succeeded"
                );
                Step::Done(Ok(value))
            }
            CallOutcome::Completed(Err(err)) => {
                let rate_limited = self.policy.is_rate_limit_error(&err);
                {
                    let mut budget = self.budget();
                    budget.record(false, elapsed);
                    if rate_limited {
                        budget.record_rate_limited();
                    }
                }

                if rate_limited {
                    warn!(
                        limiter = %self.name,
                        attempt = attempts.number(),
                        error = %err,
                        "provider signaled rate limit"
                    );
                    attempts.on_rate_limited(err.to_string())
                } else {
                    error!(limiter = %self.name, error = %err, "call failed");
                    Step::Done(Err(LimiterError::Call(err)))
                }
            }
            CallOutcome::TimedOut(after) => {
                self.budget().record(false, elapsed);
                error!(limiter = %self.name, timeout_ms = after.as_millis() as u64, "call timed out");
                Step::Done(Err(LimiterError::Timeout(after)))
            }
            CallOutcome::Aborted(message) => {
                self.budget().record(false, elapsed);
                error!(limiter = %self.name, %message, "call aborted");
                Step::Done(Err(LimiterError::Aborted(message)))
            }
        }
    }

    pub fn statistics(&self) -> CallStatistics {
        self.budget().statistics().clone()
    }

    pub fn health(&self) -> HealthStatus {
        self.budget().health()
    }

    /// Calls currently holding a concurrency slot
    pub fn in_flight(&self) -> usize {
        self.config
            .max_concurrent_calls
            .saturating_sub(self.slots.available_permits())
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        let mut budget = self.budget();
        let (calls_this_minute, calls_this_hour) = budget.usage(Instant::now());
        let counters = budget.statistics().clone();
        let health = budget.health();
        drop(budget);

        LimiterSnapshot {
            name: self.name.clone(),
            config: self.config.clone(),
            current_usage: CurrentUsage {
                calls_this_minute,
                calls_this_hour,
                concurrent_calls: self.in_flight(),
            },
            statistics: StatisticsSnapshot {
                success_rate: counters.success_rate(),
                counters,
            },
            health,
        }
    }

    /// Clear statistics, health and both windows
    pub fn reset(&self) {
        self.budget().reset();
        info!(limiter = %self.name, "rate limiter statistics reset");
    }
}
