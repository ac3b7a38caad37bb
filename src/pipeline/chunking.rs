//! # Word Chunking Module
//!
//! Splits extracted book text into overlapping windows of words. Each window
//! becomes one embedded chunk, so the overlap keeps a sentence that straddles
//! a boundary retrievable from either side.

use serde::Serialize;
use tracing::{debug, instrument};

use super::ChunkOptions;
use super::error::PipelineError;

/// A chunk of text with its position in the book
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// The text of the chunk
    pub text: String,

    /// The position of the chunk in the original document
    pub position: usize,
}

/// Chunk text into windows of `target_chunk_size` words that overlap by
/// `overlap_size` words.
///
/// Whitespace inside a chunk is normalized to single spaces.
#[instrument(skip(text), fields(chars = text.len()))]
pub fn chunk_words(text: &str, options: &ChunkOptions) -> Result<Vec<TextChunk>, PipelineError> {
    if options.target_chunk_size == 0 || options.overlap_size >= options.target_chunk_size {
        return Err(PipelineError::Chunking(format!(
            "invalid chunk options: size {}, overlap {}",
            options.target_chunk_size, options.overlap_size
        )));
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let step = options.target_chunk_size - options.overlap_size;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + options.target_chunk_size).min(words.len());
        chunks.push(TextChunk {
            text: words[start..end].join(" "),
            position: chunks.len(),
        });
        if end == words.len() {
            break;
        }
        start += step;
    }

    debug!(words = words.len(), chunks = chunks.len(), "chunked text");
    Ok(chunks)
}
