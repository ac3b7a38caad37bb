//! Text extraction seam.
//!
//! PDF and EPUB parsing live outside this crate; they plug in by implementing
//! `TextExtractor`.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::error::PipelineError;

/// Turns a book file into plain text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, PipelineError>;
}

/// Reads UTF-8 text files as they are
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, PipelineError> {
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8(bytes).map_err(|e| {
            PipelineError::Extraction(format!("{} is not UTF-8 text: {e}", path.display()))
        })?;
        debug!(path = %path.display(), chars = text.len(), "extracted text");
        Ok(text)
    }
}
