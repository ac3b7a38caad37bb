//! Provider error classification.
//!
//! Providers do not hand back a structured "you are throttled" code through
//! every SDK path, so failures are classified by matching their text against a
//! keyword table. The table is a policy: swap it per provider, or replace it
//! with a status-code check once one is available.

use std::fmt::Display;

/// Vocabulary used by the default policy. Matching is case-insensitive.
///
/// Bare "rate" and "limit" also match unrelated words such as "generate" or
/// "delimiter"; use [`RateLimitPolicy::strict`] when that matters.
pub const DEFAULT_RATE_LIMIT_KEYWORDS: &[&str] = &[
    "quota",
    "rate",
    "limit",
    "429",
    "too many",
    "resource exhausted",
    "resource_exhausted",
];

/// Phrase-level vocabulary with fewer false positives
pub const STRICT_RATE_LIMIT_KEYWORDS: &[&str] = &[
    "quota",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "429",
    "too many requests",
    "resource exhausted",
    "resource_exhausted",
];

/// Keyword table deciding which errors are provider rate-limit signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    keywords: Vec<String>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from_keywords(DEFAULT_RATE_LIMIT_KEYWORDS.iter().copied())
    }
}

impl RateLimitPolicy {
    pub fn strict() -> Self {
        Self::from_keywords(STRICT_RATE_LIMIT_KEYWORDS.iter().copied())
    }

    pub fn from_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_rate_limit_message(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.keywords.iter().any(|k| message.contains(k.as_str()))
    }

    pub fn is_rate_limit_error<E: Display + ?Sized>(&self, err: &E) -> bool {
        self.is_rate_limit_message(&err.to_string())
    }
}

/// Classify an error with the default policy
pub fn is_rate_limit_error<E: Display + ?Sized>(err: &E) -> bool {
    RateLimitPolicy::default().is_rate_limit_error(err)
}
