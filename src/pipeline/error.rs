//! Error types for the pipeline module

use thiserror::Error;

use crate::error::Error as CrateError;

/// Error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The extractor cannot handle the file
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The extracted text is blank
    #[error("Could not extract text from the book")]
    EmptyText,

    /// Chunking error
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// Chunking left nothing worth embedding
    #[error("Could not chunk text from the book")]
    NoChunks,

    /// The embedding limiter gave up
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Embedding generation error
    #[error("Embedding generation error: {0}")]
    EmbeddingGeneration(String),

    /// Every batch failed
    #[error("No chunk could be embedded ({total} chunks attempted)")]
    NothingEmbedded { total: usize },

    /// Vector store error
    #[error("Vector store error: {0}")]
    Store(String),
}

impl From<PipelineError> for CrateError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Io(e) => CrateError::Io(e),
            PipelineError::RateLimited(reason) => CrateError::RateLimited(reason),
            _ => CrateError::Process(err.to_string()),
        }
    }
}
