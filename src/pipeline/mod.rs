//! # Embedding Pipeline Module
//!
//! The work a queue worker performs for one book:
//!
//! 1. Skip the book if the vector store already holds it
//! 2. Extract the text and split it into word chunks
//! 3. Embed the chunks in batches, one rate-limited remote call per batch
//! 4. Store the vectors and report progress as batches land
//!
//! A batch that fails for any reason other than rate limiting is logged and
//! skipped; the book still succeeds if at least one chunk was stored. When the
//! embedding limiter gives up, the whole task fails so it can be resubmitted
//! once the quota recovers.

mod chunking;
mod config;
mod error;
mod extract;
mod store;

pub use chunking::{TextChunk, chunk_words};
pub use config::{ChunkOptions, PipelineConfig, PipelineConfigBuilder};
pub use error::PipelineError;
pub use extract::{PlainTextExtractor, TextExtractor};
pub use store::{
    MemoryVectorStore, ScoredChunk, StoreStats, StoredChunk, VectorStore, cosine_similarity,
};

use std::sync::Arc;

use async_trait::async_trait;
use rig::embeddings::EmbeddingModel;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::limiter::{LimiterError, RateLimiter};
use crate::queue::{ProgressReporter, Task, TaskProcessor, TaskTarget};

/// Progress once text is extracted and chunked
const EMBEDDING_START: f64 = 0.1;

/// Progress once every batch has been attempted
const EMBEDDING_END: f64 = 0.9;

/// What happened to a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Processed,
    AlreadyIndexed,
}

/// Result of indexing one book
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub status: IndexStatus,
    pub chunks_stored: usize,
    pub total_chunks: usize,
    pub failed_batches: usize,
}

/// Extracts, chunks, embeds and stores books
pub struct EmbeddingPipeline<E: EmbeddingModel> {
    model: E,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn VectorStore>,
    extractor: Arc<dyn TextExtractor>,
    config: PipelineConfig,
}

impl<E: EmbeddingModel> EmbeddingPipeline<E> {
    pub fn new(
        model: E,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn VectorStore>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            limiter,
            store,
            extractor: Arc::new(PlainTextExtractor),
            config,
        })
    }

    /// Replace the default plain text extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Index one book, calling `progress` with values between 0.1 and 0.9
    #[instrument(skip(self, progress), fields(book = %target.rag_book_id))]
    pub async fn index_book(
        &self,
        target: &TaskTarget,
        progress: impl Fn(f64) + Send + Sync,
    ) -> std::result::Result<IndexReport, PipelineError> {
        let book = target.rag_book_id.as_str();

        if self.config.skip_existing && self.store.contains_book(book).await? {
            info!("book already indexed, skipping");
            return Ok(IndexReport {
                status: IndexStatus::AlreadyIndexed,
                chunks_stored: 0,
                total_chunks: 0,
                failed_batches: 0,
            });
        }

        let text = self.extractor.extract(&target.file_path).await?;
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyText);
        }

        let chunks: Vec<TextChunk> = chunk_words(&text, &self.config.chunk_options)?
            .into_iter()
            .filter(|chunk| chunk.text.chars().count() >= self.config.min_chunk_length)
            .take(self.config.max_chunks_per_book)
            .collect();
        if chunks.is_empty() {
            return Err(PipelineError::NoChunks);
        }
        progress(EMBEDDING_START);

        let batches: Vec<&[TextChunk]> = chunks.chunks(self.config.batch_size).collect();
        let total_batches = batches.len();
        info!(chunks = chunks.len(), batches = total_batches, "embedding book");

        let mut stored = 0;
        let mut failed_batches = 0;
        for (index, batch) in batches.into_iter().enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            match self.embed_batch(book, batch).await {
                Ok(vectors) => {
                    stored += vectors.len();
                    self.store.add(vectors).await?;
                }
                Err(PipelineError::RateLimited(reason)) => {
                    warn!(batch = index, %reason, "embedding quota exhausted");
                    return Err(PipelineError::RateLimited(reason));
                }
                Err(e) => {
                    warn!(batch = index, error = %e, "skipping batch");
                    failed_batches += 1;
                }
            }

            let done = (index + 1) as f64 / total_batches as f64;
            progress(EMBEDDING_START + (EMBEDDING_END - EMBEDDING_START) * done);
        }

        if stored == 0 {
            return Err(PipelineError::NothingEmbedded {
                total: chunks.len(),
            });
        }

        info!(stored, total = chunks.len(), failed_batches, "book indexed");
        Ok(IndexReport {
            status: IndexStatus::Processed,
            chunks_stored: stored,
            total_chunks: chunks.len(),
            failed_batches,
        })
    }

    async fn embed_batch(
        &self,
        book: &str,
        batch: &[TextChunk],
    ) -> std::result::Result<Vec<StoredChunk>, PipelineError> {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();

        let embeddings = self
            .limiter
            .execute(|| self.model.embed_texts(texts.clone()))
            .await
            .map_err(|e| match e {
                LimiterError::RateLimitExceeded(reason) => {
                    PipelineError::RateLimited(reason.to_string())
                }
                other => PipelineError::EmbeddingGeneration(other.to_string()),
            })?;

        if embeddings.len() != batch.len() {
            return Err(PipelineError::EmbeddingGeneration(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            )));
        }

        debug!(book, chunks = batch.len(), "embedded batch");
        Ok(batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                StoredChunk::new(book, chunk.position, chunk.text.clone(), embedding.vec)
            })
            .collect())
    }
}

#[async_trait]
impl<E: EmbeddingModel + 'static> TaskProcessor for EmbeddingPipeline<E> {
    async fn process(&self, task: &Task, progress: &ProgressReporter) -> Result<()> {
        let report = self
            .index_book(&task.target, |value| progress.report(value))
            .await?;
        progress.report(EMBEDDING_END);
        debug!(?report, "task processed");
        Ok(())
    }
}

impl<E: EmbeddingModel> std::fmt::Debug for EmbeddingPipeline<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
