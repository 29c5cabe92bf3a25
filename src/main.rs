//! # Health RAG CLI (`hrag`)
//!
//! The `hrag` binary ingests a health corpus into a vector index and answers
//! questions against it.
//!
//! ## Usage
//!
//! ```bash
//! hrag --config ./config/hrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hrag init` | Create the SQLite database and schema |
//! | `hrag ingest <path>` | Chunk, embed, and store a document |
//! | `hrag drop <collection>` | Delete a collection before re-ingesting |
//! | `hrag search "<query>"` | Show the chunks a question would retrieve |
//! | `hrag ask "<question>"` | Answer one question |
//! | `hrag chat` | Answer questions read from stdin |
//! | `hrag stats` | List collections and entry counts |
//!
//! ## Examples
//!
//! ```bash
//! # Replace the collection with a fresh ingest of the WHO report
//! hrag ingest ./data/health_data.pdf --drop
//!
//! # Ask with a different model and more context
//! hrag ask "Which region has the highest maternal mortality?" \
//!     --model openai/gpt-4o-mini --k 6 --sources
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use health_rag::ask::{self, AskOptions};
use health_rag::config;
use health_rag::ingest;
use health_rag::index::SqliteIndex;
use health_rag::progress::ProgressMode;
use health_rag::search;
use health_rag::stats;

/// Health RAG: grounded answers to health questions from an indexed corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "hrag",
    about = "Health RAG: retrieval-augmented answers over a health statistics corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/hrag.toml`; built-in defaults apply when that
    /// file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline progress (equivalent to RUST_LOG=info).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `collections` and `entries`
    /// tables. Safe to run repeatedly.
    Init,

    /// Ingest a document into a collection.
    ///
    /// Loads the file (`.pdf` per page, anything else as UTF-8 text), chunks
    /// it, embeds every chunk, and stores the vectors. Without `--drop`,
    /// re-ingesting appends duplicate entries.
    Ingest {
        /// Path to the source document.
        path: PathBuf,

        /// Target collection (defaults to `retrieval.collection`).
        #[arg(long)]
        collection: Option<String>,

        /// Replace the collection's contents. The old entries are dropped
        /// only once every chunk has been embedded.
        #[arg(long)]
        drop: bool,

        /// Progress output on stderr: `human`, `json`, or `off`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long, value_parser = ["human", "json", "off"])]
        progress: Option<String>,
    },

    /// Drop a collection and all of its entries.
    Drop {
        /// Collection name.
        collection: String,
    },

    /// Retrieve the chunks most similar to a query, without generation.
    Search {
        /// The search query string.
        query: String,

        /// Number of chunks to return.
        #[arg(long)]
        k: Option<usize>,

        /// Collection to search (defaults to `retrieval.collection`).
        #[arg(long)]
        collection: Option<String>,
    },

    /// Answer one question.
    ///
    /// Prints the answer, or `Error: <reason>` when retrieval or generation
    /// fails for this question.
    Ask {
        /// The question.
        question: String,

        #[command(flatten)]
        options: AskArgs,
    },

    /// Answer questions read line by line from stdin.
    Chat {
        #[command(flatten)]
        options: AskArgs,
    },

    /// Show collections, entry counts, and pinned embedders.
    Stats,
}

#[derive(clap::Args)]
struct AskArgs {
    /// Generation model identifier (defaults to `generation.model`).
    #[arg(long)]
    model: Option<String>,

    /// Number of chunks to retrieve (defaults to `retrieval.top_k`).
    #[arg(long)]
    k: Option<usize>,

    /// Sampling temperature, 0.0 to 2.0.
    #[arg(long)]
    temperature: Option<f32>,

    /// Maximum tokens in the answer.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Print the chunks used as context after the answer.
    #[arg(long)]
    sources: bool,
}

impl AskArgs {
    fn split(self) -> (AskOptions, bool) {
        (
            AskOptions {
                model: self.model,
                k: self.k,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            self.sources,
        )
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn progress_mode(flag: Option<&str>) -> ProgressMode {
    match flag {
        Some("json") => ProgressMode::Json,
        Some("off") => ProgressMode::Off,
        Some(_) => ProgressMode::Human,
        None => ProgressMode::default_for_tty(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            let index = SqliteIndex::connect(&cfg.db).await?;
            index.pool().close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            collection,
            drop,
            progress,
        } => {
            let mode = progress_mode(progress.as_deref());
            ingest::run_ingest(&cfg, &path, collection, drop, mode).await?;
        }
        Commands::Drop { collection } => {
            ingest::run_drop(&cfg, &collection).await?;
        }
        Commands::Search {
            query,
            k,
            collection,
        } => {
            search::run_search(&cfg, &query, k, collection).await?;
        }
        Commands::Ask { question, options } => {
            let (options, show_sources) = options.split();
            ask::run_ask(&cfg, &question, &options, show_sources).await?;
        }
        Commands::Chat { options } => {
            let (options, show_sources) = options.split();
            ask::run_chat(&cfg, &options, show_sources).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
