//! # Search Error Types Module
//!
//! Error types for answering questions over the indexed books.
//!
//! ## Key Components
//!
//! - `SearchError`: Enum representing different types of search failures
//!
//! A `RateLimited` error means one of the limiters gave up; the caller should
//! tell the user the system is busy and retry later.

use thiserror::Error;

use crate::error::Error as CrateError;
use crate::pipeline::PipelineError;

/// Errors that can occur during search operations
#[derive(Debug, Error)]
pub enum SearchError {
    /// The question is blank
    #[error("Query is empty")]
    EmptyQuery,

    /// A limiter gave up on the embedding or generation call
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Error occurred during embedding generation
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Error occurred during answer generation
    #[error("Generation error: {0}")]
    Generation(String),

    /// Error occurred in the vector store
    #[error("Store error: {0}")]
    Store(#[from] PipelineError),
}

impl From<SearchError> for CrateError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::RateLimited(reason) => CrateError::RateLimited(reason),
            _ => CrateError::Search(err.to_string()),
        }
    }
}
