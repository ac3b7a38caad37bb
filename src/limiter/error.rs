//! Error types for the limiter module

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use super::budget::RateLimitReason;
use crate::error::Error as CrateError;

/// Failure of a rate-limited call.
///
/// `E` is the error type of the wrapped call. Errors that are not rate-limit
/// signals come back untouched in [`LimiterError::Call`].
#[derive(Debug, Error)]
pub enum LimiterError<E> {
    /// Local budget exhausted, or the provider kept throttling
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(RateLimitReason),

    /// The wrapped call did not finish within the configured timeout
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The wrapped call panicked or could not be started
    #[error("call aborted: {0}")]
    Aborted(String),

    /// The wrapped call failed with a non rate-limit error
    #[error("{0}")]
    Call(E),
}

impl<E> LimiterError<E> {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LimiterError::RateLimitExceeded(_))
    }

    /// The original call error, if that is what this is
    pub fn into_call_error(self) -> Option<E> {
        match self {
            LimiterError::Call(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Display> From<LimiterError<E>> for CrateError {
    fn from(err: LimiterError<E>) -> Self {
        match err {
            LimiterError::RateLimitExceeded(reason) => CrateError::RateLimited(reason.to_string()),
            LimiterError::Timeout(after) => CrateError::Timeout(after),
            LimiterError::Aborted(message) => CrateError::Provider(message),
            LimiterError::Call(e) => CrateError::Provider(e.to_string()),
        }
    }
}
