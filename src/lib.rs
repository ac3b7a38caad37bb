//! # bookrag - Rate-Limited Indexing and RAG for a Book Library
//!
//! This crate keeps a personal library's calls to a hosted model provider
//! inside the provider's quotas while books are embedded in the background and
//! questions are answered over them.
//!
//! ## Features
//!
//! - Rate limiters with per-minute and per-hour budgets, a concurrency cap and
//!   exponential backoff on provider throttling
//! - A priority queue of indexing tasks served by a fixed pool of async workers
//! - An embedding pipeline that extracts, chunks and embeds books in batches
//! - Semantic search and answer generation over one book or the whole library
//! - Async API with Tokio
//! - Robust error handling and logging
//!
//! ## Example
//!
//! ```rust,no_run
//! use bookrag::limiter::{LimiterConfig, RateLimiter};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LimiterConfig::builder()
//!         .max_calls_per_minute(15)
//!         .max_retries(3)
//!         .retry_delay(Duration::from_secs(1))
//!         .build();
//!     let limiter = RateLimiter::new("generation", config)?;
//!
//!     let reply = limiter
//!         .execute(|| async { Ok::<_, std::io::Error>("pong") })
//!         .await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

mod error;
pub mod config;
pub mod limiter;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod search;
pub mod service;

pub use error::{Error, Result};

/// Re-export of the types most callers need
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{Error, Result};
    pub use crate::queue::{Task, TaskId, TaskPriority, TaskStatus, TaskTarget};
    pub use crate::service::RagService;
}
