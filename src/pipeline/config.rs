//! # Pipeline Configuration Module
//!
//! Configuration for turning a book into stored embeddings.
//!
//! ## Key Components
//!
//! - `ChunkOptions`: Controls the chunking behavior (size and overlap)
//! - `PipelineConfig`: Complete configuration for the embedding pipeline
//! - `PipelineConfigBuilder`: Builder pattern implementation for easier configuration
//!
//! Batch size and batch delay decide how hard one book leans on the embedding
//! limiter: every batch is one remote call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_secs;
use crate::error::{Error, Result};

/// Configuration for chunking text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkOptions {
    /// Target size of each chunk in words
    pub target_chunk_size: usize,

    /// Size of overlap between chunks in words
    pub overlap_size: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            target_chunk_size: 500,
            overlap_size: 50,
        }
    }
}

/// Configuration for the embedding pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Options for chunking
    pub chunk_options: ChunkOptions,

    /// Chunks shorter than this many characters are dropped
    pub min_chunk_length: usize,

    /// Chunks beyond this count are not embedded
    pub max_chunks_per_book: usize,

    /// Chunks embedded per remote call
    pub batch_size: usize,

    /// Pause between two batches of the same book
    #[serde(with = "duration_secs")]
    pub batch_delay: Duration,

    /// Treat a book already present in the store as done
    pub skip_existing: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_options: ChunkOptions::default(),
            min_chunk_length: 50,
            max_chunks_per_book: 100,
            batch_size: 5,
            batch_delay: Duration::from_millis(500),
            skip_existing: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        let chunks = &self.chunk_options;
        if chunks.target_chunk_size == 0 {
            return Err(Error::Config(
                "target_chunk_size must be at least 1".to_string(),
            ));
        }
        if chunks.overlap_size >= chunks.target_chunk_size {
            return Err(Error::Config(format!(
                "overlap_size ({}) must be smaller than target_chunk_size ({})",
                chunks.overlap_size, chunks.target_chunk_size
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_chunks_per_book == 0 {
            return Err(Error::Config(
                "max_chunks_per_book must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// Set the chunk options
    pub fn chunk_options(mut self, chunk_options: ChunkOptions) -> Self {
        self.config.chunk_options = chunk_options;
        self
    }

    /// Set the target chunk size
    pub fn target_chunk_size(mut self, target_chunk_size: usize) -> Self {
        self.config.chunk_options.target_chunk_size = target_chunk_size;
        self
    }

    /// Set the overlap size
    pub fn overlap_size(mut self, overlap_size: usize) -> Self {
        self.config.chunk_options.overlap_size = overlap_size;
        self
    }

    /// Set the minimum chunk length
    pub fn min_chunk_length(mut self, min_chunk_length: usize) -> Self {
        self.config.min_chunk_length = min_chunk_length;
        self
    }

    /// Set the chunk cap per book
    pub fn max_chunks_per_book(mut self, max_chunks_per_book: usize) -> Self {
        self.config.max_chunks_per_book = max_chunks_per_book;
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set the pause between batches
    pub fn batch_delay(mut self, batch_delay: Duration) -> Self {
        self.config.batch_delay = batch_delay;
        self
    }

    /// Set whether indexed books are skipped
    pub fn skip_existing(mut self, skip_existing: bool) -> Self {
        self.config.skip_existing = skip_existing;
        self
    }

    /// Build the configuration
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.chunk_options.target_chunk_size, 500);
        assert_eq!(config.chunk_options.overlap_size, 50);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.batch_delay, Duration::from_millis(500));
        assert!(config.skip_existing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::builder()
            .target_chunk_size(100)
            .overlap_size(10)
            .min_chunk_length(5)
            .max_chunks_per_book(7)
            .batch_size(2)
            .batch_delay(Duration::ZERO)
            .skip_existing(false)
            .build();

        assert_eq!(config.chunk_options.target_chunk_size, 100);
        assert_eq!(config.chunk_options.overlap_size, 10);
        assert_eq!(config.min_chunk_length, 5);
        assert_eq!(config.max_chunks_per_book, 7);
        assert_eq!(config.batch_size, 2);
        assert!(!config.skip_existing);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let config = PipelineConfig::builder()
            .target_chunk_size(10)
            .overlap_size(10)
            .build();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(PipelineConfig::builder().batch_size(0).build().validate().is_err());
    }
}
