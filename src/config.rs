//! # Settings Module
//!
//! Aggregates the configuration of every component into one `Settings` value
//! that can be loaded from a JSON file. Missing fields fall back to their
//! defaults, so a file only needs to name what it changes:
//!
//! ```json
//! {
//!   "generation": { "max_calls_per_minute": 10 },
//!   "queue": { "max_concurrent_tasks": 4, "poll_interval": 0.5 }
//! }
//! ```
//!
//! Durations are written as fractional seconds.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::limiter::LimiterConfig;
use crate::pipeline::PipelineConfig;
use crate::queue::QueueConfig;
use crate::search::SearchOptions;

/// Complete configuration of a `RagService`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Limiter for answer generation calls
    pub generation: LimiterConfig,

    /// Limiter for embedding calls
    pub embedding: LimiterConfig,

    pub queue: QueueConfig,

    pub pipeline: PipelineConfig,

    pub search: SearchOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            generation: LimiterConfig::generation(),
            embedding: LimiterConfig::embedding(),
            queue: QueueConfig::default(),
            pipeline: PipelineConfig::default(),
            search: SearchOptions::default(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading settings");
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.generation.validate()?;
        self.embedding.validate()?;
        self.queue.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as fractional seconds
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
