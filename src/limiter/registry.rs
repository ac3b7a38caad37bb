//! The two limiters every remote call goes through, built once at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::{LimiterConfig, LimiterSnapshot, RateLimiter};
use crate::error::Result;

pub const GENERATION: &str = "generation";
pub const EMBEDDING: &str = "embedding";

/// Owner of the generation and embedding limiters.
///
/// Cloning is cheap and every clone shares the same limiters.
#[derive(Debug, Clone)]
pub struct LimiterRegistry {
    generation: Arc<RateLimiter>,
    embedding: Arc<RateLimiter>,
}

impl LimiterRegistry {
    pub fn new(generation: LimiterConfig, embedding: LimiterConfig) -> Result<Self> {
        Ok(Self {
            generation: Arc::new(RateLimiter::new(GENERATION, generation)?),
            embedding: Arc::new(RateLimiter::new(EMBEDDING, embedding)?),
        })
    }

    /// Registry with the generation and embedding presets
    pub fn with_presets() -> Result<Self> {
        Self::new(LimiterConfig::generation(), LimiterConfig::embedding())
    }

    pub fn generation(&self) -> &Arc<RateLimiter> {
        &self.generation
    }

    pub fn embedding(&self) -> &Arc<RateLimiter> {
        &self.embedding
    }

    /// Snapshot of every limiter, keyed by limiter name
    pub fn stats(&self) -> BTreeMap<String, LimiterSnapshot> {
        [&self.generation, &self.embedding]
            .into_iter()
            .map(|limiter| (limiter.name().to_string(), limiter.snapshot()))
            .collect()
    }

    pub fn reset_all(&self) {
        self.generation.reset();
        self.embedding.reset();
        info!("all rate limiters reset");
    }
}
