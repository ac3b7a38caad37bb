//! # LLM Client Module
//!
//! A unified client holding the completion model used to answer questions and
//! the embedding model used to index books and queries.
//!
//! The models are plain `rig` models. Quotas are not enforced here: every call
//! site routes its remote calls through the matching `RateLimiter`, so one
//! budget covers every caller of a model.
//!
//! ## Key Components
//!
//! - `Client`: A unified client that wraps both completion and embedding models
//! - `Client::new_gemini_from_env`: Gemini models configured from `GEMINI_API_KEY`

use rig::{completion::CompletionModel, embeddings::EmbeddingModel, providers::gemini};

use crate::error::{Error, Result};

#[cfg(test)]
pub(crate) mod mock_model;

/// Gemini model used for answers
pub const GENERATION_MODEL: &str = "gemini-2.0-flash";

/// Environment variable holding the Gemini API key
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone)]
pub struct Client<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    completion_model: C,
    embedding_model: E,
}

impl Client<gemini::completion::CompletionModel, gemini::embedding::EmbeddingModel> {
    pub fn new_gemini_from_env() -> Result<Self> {
        let gemini_api_key = std::env::var(API_KEY_VAR)
            .map_err(|_| Error::Config(format!("{API_KEY_VAR} environment variable must be set")))?;
        let gemini_client = gemini::Client::new(&gemini_api_key);
        Ok(Self::new_gemini(gemini_client))
    }

    pub fn new_gemini(gemini_client: gemini::Client) -> Self {
        Self {
            completion_model: gemini_client.completion_model(GENERATION_MODEL),
            embedding_model: gemini_client.embedding_model(gemini::embedding::EMBEDDING_004),
        }
    }
}

impl<C, E> Client<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    pub fn new(completion_model: C, embedding_model: E) -> Self {
        Self {
            completion_model,
            embedding_model,
        }
    }

    pub fn completion(&self) -> &C {
        &self.completion_model
    }

    pub fn embedding(&self) -> &E {
        &self.embedding_model
    }
}
