//! # Mock Models for Testing
//!
//! Provides a `MockCompletionModel` and a `MockEmbeddingModel` that implement
//! the rig model traits for use in tests. Both can be scripted to fail their
//! next calls, which is how provider throttling is simulated without making
//! actual API calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rig::{
    completion::{
        AssistantContent, CompletionError, CompletionModel, CompletionRequest, CompletionResponse,
    },
    embeddings::{Embedding, EmbeddingError, EmbeddingModel},
    one_or_many::OneOrMany,
};

/// A mock completion model for testing purposes.
/// It returns a predefined response, or the next scripted error.
#[derive(Debug, Clone)]
pub struct MockCompletionModel {
    response: Arc<Mutex<String>>,
    failures: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockCompletionModel {
    /// Creates a new mock model that answers with an empty text.
    pub fn new() -> Self {
        Self {
            response: Arc::new(Mutex::new(String::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sets the text every successful call returns.
    pub fn set_text_response(&self, text: &str) {
        *self.response.lock().unwrap() = text.to_string();
    }

    /// Makes the next call fail with a provider error carrying `message`.
    pub fn fail_next(&self, message: &str) {
        self.failures.lock().unwrap().push_back(message.to_string());
    }

    /// Prompts received so far, preamble first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockCompletionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionModel for MockCompletionModel {
    type Response = String;

    async fn completion(
        &self,
        completion_request: CompletionRequest,
    ) -> Result<CompletionResponse<Self::Response>, CompletionError> {
        let prompt = format!(
            "{}\n{:?}",
            completion_request.preamble.unwrap_or_default(),
            completion_request.prompt
        );
        self.prompts.lock().unwrap().push(prompt);

        if let Some(message) = self.failures.lock().unwrap().pop_front() {
            return Err(CompletionError::ProviderError(message));
        }

        let text = self.response.lock().unwrap().clone();
        Ok(CompletionResponse {
            choice: OneOrMany::one(AssistantContent::text(&text)),
            raw_response: text,
        })
    }
}

/// A mock embedding model for testing purposes.
///
/// Vectors are bag-of-words counts hashed into `ndims` buckets, so texts that
/// share words are similar and search results are predictable.
#[derive(Debug, Clone)]
pub struct MockEmbeddingModel {
    ndims: usize,
    failures: Arc<Mutex<VecDeque<String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingModel {
    pub fn new(ndims: usize) -> Self {
        Self {
            ndims,
            failures: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes the next call fail with a provider error carrying `message`.
    pub fn fail_next(&self, message: &str) {
        self.failures.lock().unwrap().push_back(message.to_string());
    }

    /// Number of `embed_texts` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f64> {
        let mut vec = vec![0.0; self.ndims];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let bucket = word
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                % self.ndims;
            vec[bucket] += 1.0;
        }
        vec
    }
}

impl Default for MockEmbeddingModel {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EmbeddingModel for MockEmbeddingModel {
    const MAX_DOCUMENTS: usize = 100;

    fn ndims(&self) -> usize {
        self.ndims
    }

    async fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.failures.lock().unwrap().pop_front() {
            return Err(EmbeddingError::ProviderError(message));
        }

        Ok(texts
            .into_iter()
            .map(|document| Embedding {
                vec: self.vector_for(&document),
                document,
            })
            .collect())
    }
}
