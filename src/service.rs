//! # Service Context
//!
//! `RagService` wires the limiters, the indexing queue and the search system
//! around one vector store. Build it once at startup and share it by
//! reference; the crate keeps no global state.
//!
//! ```rust,no_run
//! use bookrag::config::Settings;
//! use bookrag::model::Client;
//! use bookrag::queue::{TaskPriority, TaskTarget};
//! use bookrag::service::RagService;
//!
//! # async fn run() -> bookrag::Result<()> {
//! let service = RagService::new(Settings::default(), Client::new_gemini_from_env()?)?;
//! service.start();
//!
//! let target = TaskTarget::new(1, "moby-dick.txt", "book_1");
//! let id = service.submit_task(target, TaskPriority::High, "reader")?;
//! let task = service.wait_for(&id).await?;
//! println!("{}: {}", task.id, task.status);
//!
//! let answer = service.answer("Who is Ishmael?", Some("book_1")).await?;
//! println!("{}", answer.text);
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rig::completion::CompletionModel;
use rig::embeddings::EmbeddingModel;
use tracing::{debug, info, instrument};

use crate::config::Settings;
use crate::error::Result;
use crate::limiter::{LimiterRegistry, LimiterSnapshot};
use crate::model::Client;
use crate::pipeline::{EmbeddingPipeline, MemoryVectorStore, ScoredChunk, VectorStore};
use crate::queue::{QueueStatistics, Task, TaskId, TaskPriority, TaskQueue, TaskTarget};
use crate::search::{Answer, SearchSystem};

/// User id recorded when the caller does not name one
pub const ANONYMOUS_USER: &str = "anonymous";

/// Process-wide context for indexing and answering
pub struct RagService<C: CompletionModel, E: EmbeddingModel> {
    settings: Settings,
    limiters: LimiterRegistry,
    store: Arc<dyn VectorStore>,
    queue: TaskQueue,
    search: SearchSystem<C, E>,
}

impl<C, E> RagService<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel + 'static,
{
    /// Service backed by an in-memory vector store
    pub fn new(settings: Settings, client: Client<C, E>) -> Result<Self> {
        Self::with_store(settings, client, Arc::new(MemoryVectorStore::new()))
    }

    pub fn with_store(
        settings: Settings,
        client: Client<C, E>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        settings.validate()?;
        let limiters =
            LimiterRegistry::new(settings.generation.clone(), settings.embedding.clone())?;

        let pipeline = EmbeddingPipeline::new(
            client.embedding().clone(),
            Arc::clone(limiters.embedding()),
            Arc::clone(&store),
            settings.pipeline.clone(),
        )?;
        let queue = TaskQueue::new(settings.queue.clone(), Arc::new(pipeline))?;
        let search = SearchSystem::new(
            client,
            limiters.clone(),
            Arc::clone(&store),
            settings.search.clone(),
        );

        Ok(Self {
            settings,
            limiters,
            store,
            queue,
            search,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn limiters(&self) -> &LimiterRegistry {
        &self.limiters
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// The indexing queue, for registering progress and completion callbacks
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Start the indexing workers
    pub fn start(&self) {
        self.queue.start();
    }

    /// Stop the workers after their current tasks
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        info!("service stopped");
    }

    /// Queue a book for indexing
    pub fn submit_task(
        &self,
        target: TaskTarget,
        priority: TaskPriority,
        user_id: &str,
    ) -> Result<TaskId> {
        Ok(self.queue.submit(target, priority, user_id)?)
    }

    /// Queue a book, waiting one poll interval between attempts while the
    /// backlog is full. Needs running workers to make progress.
    #[instrument(skip(self, target), fields(book_id = target.book_id))]
    pub async fn submit_when_ready(
        &self,
        target: TaskTarget,
        priority: TaskPriority,
        user_id: &str,
    ) -> Result<TaskId> {
        loop {
            match self.submit_task(target.clone(), priority, user_id) {
                Err(e) if e.is_busy() => {
                    debug!(error = %e, "queue busy, retrying submission");
                    tokio::time::sleep(self.settings.queue.poll_interval).await;
                }
                submitted => return submitted,
            }
        }
    }

    /// Queue a book at normal priority for the anonymous user
    pub fn submit(&self, target: TaskTarget) -> Result<TaskId> {
        self.submit_task(target, TaskPriority::default(), ANONYMOUS_USER)
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Task> {
        Ok(self.queue.get_status(id)?)
    }

    /// Cancel a task that has not started yet
    pub fn cancel_task(&self, id: &TaskId) -> bool {
        self.queue.cancel(id)
    }

    pub fn queue_position(&self, id: &TaskId) -> Option<usize> {
        self.queue.queue_position(id)
    }

    pub fn estimated_wait(&self, id: &TaskId) -> Option<Duration> {
        self.queue.estimated_wait(id)
    }

    pub fn queue_stats(&self) -> QueueStatistics {
        self.queue.stats()
    }

    /// Snapshot of every limiter, keyed by name
    pub fn rate_limit_stats(&self) -> BTreeMap<String, LimiterSnapshot> {
        self.limiters.stats()
    }

    /// Forget finished tasks older than `max_age`
    pub fn cleanup(&self, max_age: Duration) -> usize {
        self.queue.cleanup(max_age)
    }

    /// Poll a task until it reaches a terminal status
    #[instrument(skip(self))]
    pub async fn wait_for(&self, id: &TaskId) -> Result<Task> {
        loop {
            let task = self.get_task(id)?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(self.settings.queue.poll_interval).await;
        }
    }

    pub async fn search(&self, query: &str, book: Option<&str>) -> Result<Vec<ScoredChunk>> {
        Ok(self.search.search(query, book).await?)
    }

    /// Answer a question about one book, or about the whole library
    pub async fn answer(&self, question: &str, book: Option<&str>) -> Result<Answer> {
        Ok(self.search.answer(question, book).await?)
    }
}

impl<C: CompletionModel, E: EmbeddingModel> std::fmt::Debug for RagService<C, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagService")
            .field("queue", &self.queue)
            .field("search", &self.search)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::error::Error;
    use crate::model::mock_model::{MockCompletionModel, MockEmbeddingModel};
    use crate::pipeline::PipelineConfig;
    use crate::queue::{QueueConfig, TaskStatus};

    const MOBY: &str = "Call me Ishmael. Some years ago I went to sea aboard a whaling ship. \
        The white whale Moby Dick haunted captain Ahab for many long years.";

    fn settings(max_queue_size: usize) -> Settings {
        Settings {
            queue: QueueConfig::builder()
                .max_concurrent_tasks(2)
                .max_queue_size(max_queue_size)
                .poll_interval(Duration::from_millis(100))
                .build(),
            pipeline: PipelineConfig::builder()
                .target_chunk_size(10)
                .overlap_size(2)
                .min_chunk_length(10)
                .batch_size(2)
                .batch_delay(Duration::ZERO)
                .build(),
            ..Settings::default()
        }
    }

    fn service(
        max_queue_size: usize,
    ) -> (
        RagService<MockCompletionModel, MockEmbeddingModel>,
        MockCompletionModel,
    ) {
        let completion = MockCompletionModel::new();
        let client = Client::new(completion.clone(), MockEmbeddingModel::default());
        (
            RagService::new(settings(max_queue_size), client).unwrap(),
            completion,
        )
    }

    fn book_file(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{text}").unwrap();
        file
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_then_answer() {
        let (service, completion) = service(10);
        completion.set_text_response("Captain Ahab.");
        service.start();

        let file = book_file(MOBY);
        let id = service.submit(TaskTarget::new(1, file.path(), "moby")).unwrap();
        let task = service.wait_for(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 1.0);
        assert_eq!(task.user_id, ANONYMOUS_USER);

        let answer = service
            .answer("Who did the white whale haunt?", Some("moby"))
            .await
            .unwrap();
        assert_eq!(answer.text, "Captain Ahab.");
        assert_eq!(answer.books_consulted, 1);

        let stats = service.queue_stats();
        assert_eq!(stats.completed_tasks, 1);

        let limits = service.rate_limit_stats();
        assert_eq!(limits.keys().collect::<Vec<_>>(), vec!["embedding", "generation"]);
        assert!(limits["embedding"].statistics.counters.successful_calls >= 2);
        assert_eq!(limits["generation"].statistics.counters.successful_calls, 1);

        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_fails_task() {
        let (service, _) = service(10);
        service.start();

        let id = service
            .submit_task(
                TaskTarget::new(7, "/no/such/book.txt", "missing"),
                TaskPriority::Urgent,
                "reader",
            )
            .unwrap();
        let task = service.wait_for(&id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error_message.is_some());
        assert_eq!(service.queue_stats().failed_tasks, 1);

        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_waits_for_room_in_the_queue() {
        let (service, _) = service(1);
        service.start();

        let files: Vec<_> = (0..3).map(|_| book_file(MOBY)).collect();
        let mut ids = Vec::new();
        for (i, file) in files.iter().enumerate() {
            let target = TaskTarget::new(i as i64 + 1, file.path(), format!("moby_{i}"));
            ids.push(
                service
                    .submit_when_ready(target, TaskPriority::Normal, "reader")
                    .await
                    .unwrap(),
            );
        }

        for id in &ids {
            assert_eq!(
                service.wait_for(id).await.unwrap().status,
                TaskStatus::Completed
            );
        }
        assert_eq!(service.queue_stats().completed_tasks, 3);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_errors_surface_as_crate_errors() {
        let (service, _) = service(1);

        let first = service
            .submit(TaskTarget::new(1, "/books/1.txt", "book_1"))
            .unwrap();
        let err = service
            .submit(TaskTarget::new(2, "/books/2.txt", "book_2"))
            .unwrap_err();
        assert!(matches!(err, Error::QueueFull { capacity: 1 }));
        assert!(err.is_busy());

        assert_eq!(service.queue_position(&first), Some(0));
        assert!(service.cancel_task(&first));
        assert_eq!(service.get_task(&first).unwrap().status, TaskStatus::Cancelled);

        assert!(matches!(
            service.get_task(&TaskId::new()),
            Err(Error::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = Settings::default();
        settings.queue.max_concurrent_tasks = 0;
        let client = Client::new(MockCompletionModel::new(), MockEmbeddingModel::default());

        assert!(matches!(
            RagService::new(settings, client),
            Err(Error::Config(_))
        ));
    }
}
