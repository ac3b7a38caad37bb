//! # Semantic Search Module for RAG
//!
//! Answers questions over the indexed books. This is the "retrieval" and
//! "generation" half of the system; the embedding pipeline is the other.
//!
//! ## Search Process
//!
//! 1. Convert the question to an embedding through the embedding limiter
//! 2. Retrieve the most similar passages, from one book or the whole library
//! 3. Build a prompt from the passages
//! 4. Generate the answer through the generation limiter
//!
//! Both remote calls share budgets with every other caller of the same
//! limiter, so a busy indexing queue slows questions down instead of pushing
//! the provider past its quota.

mod error;
mod options;
mod prompt;

pub use error::SearchError;
pub use options::SearchOptions;

use std::collections::BTreeSet;
use std::sync::Arc;

use rig::completion::CompletionModel;
use rig::embeddings::EmbeddingModel;
use rig::message::AssistantContent;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::limiter::{LimiterError, LimiterRegistry};
use crate::model::Client;
use crate::pipeline::{ScoredChunk, StoreStats, VectorStore};

/// Where a passage used for an answer came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub book_id: String,
    pub chunk_id: String,
    pub score: f64,
}

/// A generated answer and the passages behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
    /// Distinct books among the sources
    pub books_consulted: usize,
}

fn limiter_error<E: std::fmt::Display>(
    err: LimiterError<E>,
    wrap: fn(String) -> SearchError,
) -> SearchError {
    match err {
        LimiterError::RateLimitExceeded(reason) => SearchError::RateLimited(reason.to_string()),
        other => wrap(other.to_string()),
    }
}

/// Search system for RAG
pub struct SearchSystem<C: CompletionModel, E: EmbeddingModel> {
    client: Client<C, E>,
    limiters: LimiterRegistry,
    store: Arc<dyn VectorStore>,
    options: SearchOptions,
}

impl<C, E> SearchSystem<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    pub fn new(
        client: Client<C, E>,
        limiters: LimiterRegistry,
        store: Arc<dyn VectorStore>,
        options: SearchOptions,
    ) -> Self {
        Self {
            client,
            limiters,
            store,
            options,
        }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub async fn store_stats(&self) -> Result<StoreStats, SearchError> {
        Ok(self.store.stats().await?)
    }

    /// Passages most similar to `query`, from `book` or the whole library
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        book: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let embeddings = self
            .limiters
            .embedding()
            .execute(|| self.client.embedding().embed_texts(vec![query.to_string()]))
            .await
            .map_err(|e| limiter_error(e, SearchError::Embedding))?;
        let vector = embeddings
            .into_iter()
            .next()
            .map(|embedding| embedding.vec)
            .ok_or_else(|| SearchError::Embedding("provider returned no embedding".to_string()))?;

        let hits = self
            .store
            .search(&vector, self.options.limit_for(book), book)
            .await?;
        debug!(hits = hits.len(), "retrieved passages");
        Ok(hits)
    }

    /// Answer `question` from the passages of `book`, or of the whole library
    #[instrument(skip(self))]
    pub async fn answer(&self, question: &str, book: Option<&str>) -> Result<Answer, SearchError> {
        let hits = self.search(question, book).await?;
        if hits.is_empty() {
            let scope = if book.is_some() { "the book" } else { "any book" };
            return Ok(Answer {
                text: format!("No relevant information was found in {scope} to answer the question."),
                sources: Vec::new(),
                books_consulted: 0,
            });
        }

        let books: BTreeSet<&str> = hits.iter().map(|hit| hit.chunk.book_id.as_str()).collect();
        let (preamble, prompt) = match book {
            Some(_) => (prompt::BOOK_PREAMBLE, prompt::book_prompt(question, &hits)),
            None => (
                prompt::LIBRARY_PREAMBLE,
                prompt::library_prompt(question, &hits, books.len()),
            ),
        };

        let response = self
            .limiters
            .generation()
            .execute(|| {
                self.client
                    .completion()
                    .completion_request(prompt.clone())
                    .preamble(preamble.to_string())
                    .send()
            })
            .await
            .map_err(|e| limiter_error(e, SearchError::Generation))?;

        let text = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<String>>()
            .join("\n");

        info!(passages = hits.len(), books = books.len(), "answer generated");
        Ok(Answer {
            text,
            books_consulted: books.len(),
            sources: hits
                .iter()
                .map(|hit| Source {
                    book_id: hit.chunk.book_id.clone(),
                    chunk_id: hit.chunk.id.clone(),
                    score: hit.score,
                })
                .collect(),
        })
    }
}

impl<C: CompletionModel, E: EmbeddingModel> std::fmt::Debug for SearchSystem<C, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSystem")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::LimiterConfig;
    use crate::model::mock_model::{MockCompletionModel, MockEmbeddingModel};
    use crate::pipeline::{MemoryVectorStore, StoredChunk};

    struct Fixture {
        completion: MockCompletionModel,
        limiters: LimiterRegistry,
        system: SearchSystem<MockCompletionModel, MockEmbeddingModel>,
    }

    async fn fixture(max_retries: u32) -> Fixture {
        let completion = MockCompletionModel::new();
        let embedding = MockEmbeddingModel::new(32);
        let config = LimiterConfig::builder().max_retries(max_retries).build();
        let limiters = LimiterRegistry::new(config.clone(), config).unwrap();

        let store = Arc::new(MemoryVectorStore::new());
        let passages = [
            ("moby", "Call me Ishmael, a sailor on the whaling ship"),
            ("moby", "The white whale Moby Dick haunts captain Ahab"),
            ("emma", "Emma Woodhouse, handsome, clever, and rich"),
        ];
        let chunks = passages
            .iter()
            .enumerate()
            .map(|(i, (book, text))| {
                StoredChunk::new(book, i, text.to_string(), embedding.vector_for(text))
            })
            .collect();
        store.add(chunks).await.unwrap();

        let system = SearchSystem::new(
            Client::new(completion.clone(), embedding),
            limiters.clone(),
            store,
            SearchOptions {
                book_limit: 1,
                library_limit: 2,
            },
        );
        Fixture {
            completion,
            limiters,
            system,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_ranks_by_similarity() {
        let fixture = fixture(3).await;

        let hits = fixture.system.search("who is the white whale", None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "moby_chunk_1");

        let hits = fixture.system.search("clever", Some("emma")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.book_id, "emma");
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_uses_both_limiters() {
        let fixture = fixture(3).await;
        fixture.completion.set_text_response("Ahab hunts the whale.");

        let answer = fixture
            .system
            .answer("What does captain Ahab hunt?", Some("moby"))
            .await
            .unwrap();

        assert_eq!(answer.text, "Ahab hunts the whale.");
        assert_eq!(answer.books_consulted, 1);
        assert_eq!(answer.sources[0].chunk_id, "moby_chunk_1");

        let prompts = fixture.completion.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("answers questions about a book"));
        assert!(prompts[0].contains("Moby Dick haunts captain Ahab"));

        let stats = fixture.limiters.stats();
        assert_eq!(stats["embedding"].statistics.counters.total_calls, 1);
        assert_eq!(stats["generation"].statistics.counters.total_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_library_answer_counts_books() {
        let fixture = fixture(3).await;
        fixture.completion.set_text_response("Two books mention sailors and wealth.");

        let answer = fixture
            .system
            .answer("Ishmael sailor or Emma rich", None)
            .await
            .unwrap();

        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.books_consulted, 2);
        assert!(fixture.completion.prompts()[0].contains("expert librarian"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_throttling() {
        let fixture = fixture(1).await;
        fixture.completion.fail_next("429 Too Many Requests");
        fixture.completion.set_text_response("recovered");

        let answer = fixture.system.answer("white whale", Some("moby")).await.unwrap();
        assert_eq!(answer.text, "recovered");

        fixture.completion.fail_next("quota exceeded");
        fixture.completion.fail_next("quota exceeded");
        let err = fixture.system.answer("white whale", Some("moby")).await.unwrap_err();
        assert!(matches!(err, SearchError::RateLimited(_)));
        assert!(crate::Error::from(err).is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_query_and_no_results() {
        let fixture = fixture(3).await;

        assert!(matches!(
            fixture.system.search("   ", None).await,
            Err(SearchError::EmptyQuery)
        ));

        let answer = fixture
            .system
            .answer("anything", Some("unknown-book"))
            .await
            .unwrap();
        assert!(answer.sources.is_empty());
        assert!(fixture.completion.prompts().is_empty());
    }
}
