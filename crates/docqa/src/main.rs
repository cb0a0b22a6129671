//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa serve` | Build or load the index, then start the HTTP server |
//! | `docqa ask "<question>"` | Answer one question and exit |
//! | `docqa ingest <file>` | Copy a text file into the corpus and index it |
//! | `docqa index build` | Build the index from the corpus if none is persisted |
//! | `docqa index rebuild` | Drop the index and rebuild it from the corpus |
//! | `docqa index stats` | Show entry, source, and dimension counts |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docqa::config;
use docqa::engine::{Engine, Startup};
use docqa::server;
use docqa::sqlite_store::SqliteStore;
use docqa_core::index::VectorIndex;

/// docqa: answer questions from a private document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    version,
    about = "Answer questions from a private document corpus with retrieval-augmented generation"
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Loads the persisted index, or builds it from the corpus directory
    /// on first run. Ctrl-C persists the index and exits.
    Serve,

    /// Answer a single question.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Add a text file to the corpus and index it.
    ///
    /// The file is copied into `[corpus].dir` under a sanitized name, so a
    /// later rebuild includes it. Re-ingesting a name replaces its entries.
    Ingest {
        /// Path to the file.
        file: PathBuf,
    },

    /// Manage the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Build the index from the corpus if none is persisted.
    Build,
    /// Drop every entry and rebuild from the corpus.
    ///
    /// Required after changing the embedding model or chunking settings.
    Rebuild,
    /// Show index statistics.
    Stats,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let engine = Arc::new(Engine::start(&cfg).await?);
            server::run_server(engine).await?;
        }
        Commands::Ask { question } => {
            let engine = Engine::start(&cfg).await?;
            let answer = engine.answer(&question).await?;
            println!("{}", answer.answer);
        }
        Commands::Ingest { file } => {
            let engine = Engine::start(&cfg).await?;
            let chunks = engine.ingest_file(&file).await?;
            engine.shutdown().await?;
            println!("Ingested {} ({} chunks).", file.display(), chunks);
        }
        Commands::Index { action } => match action {
            IndexAction::Build => {
                let engine = Engine::open(&cfg).await?;
                match engine.build_or_load().await? {
                    Startup::Loaded { entries } => {
                        println!("Index already built ({} entries).", entries);
                    }
                    Startup::Built(stats) => {
                        println!(
                            "Built index: {} documents, {} chunks.",
                            stats.documents, stats.chunks
                        );
                    }
                }
                print_models(&engine);
            }
            IndexAction::Rebuild => {
                let engine = Engine::open(&cfg).await?;
                let stats = engine.rebuild().await?;
                println!(
                    "Rebuilt index: {} documents, {} chunks.",
                    stats.documents, stats.chunks
                );
                print_models(&engine);
            }
            IndexAction::Stats => {
                print_stats(&cfg).await?;
            }
        },
    }

    Ok(())
}

fn print_models(engine: &Engine) {
    let stats = engine.stats();
    println!(
        "{} sources, embedding model {}, synthesis model {}",
        stats.sources, stats.embedding_model, stats.synthesis_model
    );
}

/// Print index statistics without creating any model backend.
async fn print_stats(cfg: &config::Config) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&cfg.index.path).await?);
    let built_at = store.meta("built_at").await?;
    let index = VectorIndex::new(store);
    if built_at.is_some() {
        index.load().await?;
    }

    println!("Index:      {}", cfg.index.path.display());
    println!("Built at:   {}", built_at.as_deref().unwrap_or("never"));
    println!("Entries:    {}", index.len());
    println!("Sources:    {}", index.source_count());
    match index.dimension() {
        Some(d) => println!("Dimension:  {}", d),
        None => println!("Dimension:  -"),
    }
    Ok(())
}
