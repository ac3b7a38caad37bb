//! # bookrag CLI Application
//!
//! Command-line front end for the bookrag library: indexes plain text books
//! through the rate-limited queue and answers questions about them.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - Subcommands:
//!   - `index`: Queue books for embedding and follow their progress
//!   - `ask`: Index books, then answer a question about them
//!   - `config`: Print the effective settings
//!
//! Gemini models are used for both embeddings and answers; the API key is read
//! from `GEMINI_API_KEY`. The vector store lives in memory, so `ask` indexes
//! its books in the same run.

mod telemetry;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use bookrag::config::Settings;
use bookrag::model::Client;
use bookrag::queue::{Task, TaskId, TaskPriority, TaskStatus, TaskTarget};
use bookrag::service::{ANONYMOUS_USER, RagService};
use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rig::providers::gemini;
use tracing::instrument;

type GeminiService =
    RagService<gemini::completion::CompletionModel, gemini::embedding::EmbeddingModel>;

#[derive(Parser)]
#[command(author, version, about = "Rate-limited book indexing and question answering", long_about = None)]
struct Cli {
    /// Settings file (JSON); omitted fields keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for a daily rolling log file
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed books through the indexing queue
    Index(IndexArgs),

    /// Index books, then answer a question about them
    Ask(AskArgs),

    /// Print the effective settings as JSON
    Config,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Plain text books to index
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Queue priority (urgent|high|normal|low)
    #[arg(short, long, default_value_t = TaskPriority::Normal)]
    priority: TaskPriority,

    /// User the tasks are submitted for
    #[arg(short, long, default_value = ANONYMOUS_USER)]
    user: String,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Plain text books to answer from
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Question to answer
    #[arg(short, long)]
    question: String,

    /// Restrict the answer to one book, named by its file stem
    #[arg(short, long)]
    book: Option<String>,

    /// Passages to retrieve
    #[arg(short, long)]
    limit: Option<usize>,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = telemetry::init_tracing_subscriber(cli.log_dir.as_deref())?;

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Some(Commands::Index(args)) => index_command(settings, args).await?,
        Some(Commands::Ask(args)) => ask_command(settings, args).await?,
        Some(Commands::Config) => println!("{}", settings.to_json()?),
        None => {
            let _ = Cli::parse_from(["bookrag", "--help"]);
        }
    }

    Ok(())
}

fn gemini_service(settings: Settings) -> anyhow::Result<GeminiService> {
    let client = Client::new_gemini_from_env()?;
    Ok(RagService::new(settings, client)?)
}

/// Embedding space id of a book file
fn rag_book_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Submit every file, show a progress bar per task and wait for all of them
async fn index_files(
    service: &GeminiService,
    files: &[PathBuf],
    priority: TaskPriority,
    user: &str,
) -> anyhow::Result<Vec<Task>> {
    let multi = MultiProgress::new();
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {msg}")?
        .progress_chars("##-");

    let bars: Arc<Mutex<HashMap<TaskId, ProgressBar>>> = Arc::default();
    let progress_bars = Arc::clone(&bars);
    service.queue().on_progress(move |id, progress| {
        if let Some(bar) = progress_bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            bar.set_position((progress * 100.0).round() as u64);
        }
    });

    // Workers drain the backlog while the rest of the files are submitted
    service.start();

    let mut ids = Vec::with_capacity(files.len());
    for (i, path) in files.iter().enumerate() {
        let book = rag_book_id(path);
        let target = TaskTarget::new(i as i64 + 1, path, book.clone());
        let id = service.submit_when_ready(target, priority, user).await?;

        let bar = multi.add(ProgressBar::new(100));
        bar.set_style(style.clone());
        bar.set_message(book);
        bars.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, bar);
        ids.push(id);
    }

    let mut tasks = Vec::with_capacity(ids.len());
    for id in &ids {
        let task = service.wait_for(id).await?;
        if let Some(bar) = bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            let message = match &task.error_message {
                Some(error) => format!("{} {}: {error}", task.target.rag_book_id, task.status),
                None => format!("{} {}", task.target.rag_book_id, task.status),
            };
            bar.finish_with_message(message);
        }
        tasks.push(task);
    }
    Ok(tasks)
}

#[instrument(skip(settings))]
async fn index_command(settings: Settings, args: IndexArgs) -> anyhow::Result<()> {
    let service = gemini_service(settings)?;

    let tasks = index_files(&service, &args.files, args.priority, &args.user).await?;
    service.shutdown().await;

    let report = serde_json::json!({
        "tasks": tasks,
        "queue": service.queue_stats(),
        "rate_limits": service.rate_limit_stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = tasks
        .iter()
        .filter(|task| task.status != TaskStatus::Completed)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} books failed to index", tasks.len());
    }
    Ok(())
}

#[instrument(skip(settings))]
async fn ask_command(mut settings: Settings, args: AskArgs) -> anyhow::Result<()> {
    if let Some(limit) = args.limit {
        settings.search.book_limit = limit;
        settings.search.library_limit = limit;
    }
    let service = gemini_service(settings)?;

    let tasks = index_files(&service, &args.files, TaskPriority::Urgent, ANONYMOUS_USER).await?;
    service.shutdown().await;
    if tasks.iter().all(|task| task.status != TaskStatus::Completed) {
        anyhow::bail!("none of the books could be indexed");
    }

    let answer = service
        .answer(&args.question, args.book.as_deref())
        .await?;

    match args.format.as_str() {
        "json" => {
            let response = serde_json::json!({
                "question": args.question,
                "answer": answer,
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        _ => {
            println!("\nAnswer:");
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!("\nSources ({} books):", answer.books_consulted);
                for (i, source) in answer.sources.iter().enumerate() {
                    println!("{}. {} ({:.3})", i + 1, source.chunk_id, source.score);
                }
            }
            println!();
        }
    }

    Ok(())
}
