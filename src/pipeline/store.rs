//! # Vector Store Module
//!
//! Where embedded chunks live between indexing and search. `VectorStore` is
//! the seam for a persistent backend; `MemoryVectorStore` keeps everything in
//! process and ranks by cosine similarity.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use super::error::PipelineError;

/// An embedded chunk of one book
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    /// `{book}_chunk_{position}`
    pub id: String,

    /// Embedding space id of the book
    pub book_id: String,

    pub position: usize,

    pub text: String,

    #[serde(skip)]
    pub vector: Vec<f64>,
}

impl StoredChunk {
    pub fn new(book_id: &str, position: usize, text: String, vector: Vec<f64>) -> Self {
        Self {
            id: format!("{book_id}_chunk_{position}"),
            book_id: book_id.to_string(),
            position,
            text,
            vector,
        }
    }
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    /// Cosine similarity to the query, in `[-1, 1]`
    pub score: f64,
}

/// Totals across the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub books: usize,
    pub chunks: usize,
}

/// Storage and similarity search for embedded chunks
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn contains_book(&self, book_id: &str) -> Result<bool, PipelineError>;

    /// Insert chunks, replacing any with the same id
    async fn add(&self, chunks: Vec<StoredChunk>) -> Result<(), PipelineError>;

    /// Best `limit` chunks for `query`, optionally restricted to one book
    async fn search(
        &self,
        query: &[f64],
        limit: usize,
        book_id: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, PipelineError>;

    /// Remove every chunk of a book, returning how many were removed
    async fn remove_book(&self, book_id: &str) -> Result<usize, PipelineError>;

    async fn stats(&self) -> Result<StoreStats, PipelineError>;
}

/// Cosine similarity, 0 when either vector has no length
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// In-process vector store, keyed by book
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    books: RwLock<HashMap<String, Vec<StoredChunk>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn contains_book(&self, book_id: &str) -> Result<bool, PipelineError> {
        let books = self.books.read().unwrap_or_else(PoisonError::into_inner);
        Ok(books.get(book_id).is_some_and(|chunks| !chunks.is_empty()))
    }

    async fn add(&self, chunks: Vec<StoredChunk>) -> Result<(), PipelineError> {
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        for chunk in chunks {
            let entries = books.entry(chunk.book_id.clone()).or_default();
            match entries.iter_mut().find(|existing| existing.id == chunk.id) {
                Some(existing) => *existing = chunk,
                None => entries.push(chunk),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f64],
        limit: usize,
        book_id: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, PipelineError> {
        let books = self.books.read().unwrap_or_else(PoisonError::into_inner);

        let mut hits: Vec<ScoredChunk> = books
            .iter()
            .filter(|(book, _)| book_id.is_none_or(|wanted| wanted == book.as_str()))
            .flat_map(|(_, chunks)| chunks.iter())
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(query, &chunk.vector),
                chunk: chunk.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn remove_book(&self, book_id: &str) -> Result<usize, PipelineError> {
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        Ok(books.remove(book_id).map(|chunks| chunks.len()).unwrap_or(0))
    }

    async fn stats(&self) -> Result<StoreStats, PipelineError> {
        let books = self.books.read().unwrap_or_else(PoisonError::into_inner);
        Ok(StoreStats {
            books: books.len(),
            chunks: books.values().map(Vec::len).sum(),
        })
    }
}
