//! # docrag CLI
//!
//! The `docrag` binary drives the pipeline: ingest a source into the vector
//! store, ask questions against it, inspect chunking, and show store stats.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag ingest <source>` | Load, split, embed and index a file, directory or URI |
//! | `docrag query "<question>"` | Answer a question from the indexed evidence |
//! | `docrag chunks <source>` | Show the chunks a source would produce |
//! | `docrag stats` | Show store location, dimension, model and entry counts |
//!
//! ## Examples
//!
//! ```bash
//! # Build a fresh store from a PDF
//! docrag ingest ./docs/atlas.pdf
//!
//! # Add a directory of Markdown notes to the existing store
//! docrag ingest ./notes --append
//!
//! # Ask with five pieces of evidence, as JSON
//! docrag query "What is the capital of France?" --top-k 5 --json
//! ```

use clap::{ArgGroup, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docrag::config::{self, Config};
use docrag::models::ExportMode;
use docrag::pipeline::{self, IngestOptions};
use docrag::stats;

const DEFAULT_CONFIG_PATH: &str = "./config/docrag.toml";

/// docrag: question answering over your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docrag",
    about = "docrag: retrieval-augmented question answering over documents",
    version,
    long_about = "docrag converts documents (Markdown, text, PDF, DOCX, PPTX, XLSX) into \
    chunks with page and heading provenance, embeds them into a SQLite vector store, and \
    answers questions by retrieving the most similar chunks for a generative model."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docrag.toml`; built-in defaults apply when that
    /// file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Load, split, embed and index a source.
    ///
    /// The source is a file, a directory (walked recursively), or an
    /// `http(s)` URI. By default the store is replaced; pass `--append` to
    /// add to it instead.
    #[command(group(ArgGroup::new("write_mode").args(["overwrite", "append"])))]
    Ingest {
        /// File, directory, or URI to ingest.
        source: String,

        /// Export mode: `plain_text` or `structured`.
        #[arg(long)]
        export_mode: Option<ExportMode>,

        /// Replace the existing store contents.
        #[arg(long)]
        overwrite: bool,

        /// Keep the existing store contents and add to them.
        #[arg(long)]
        append: bool,

        /// Dry run: show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a question from the indexed documents.
    ///
    /// Prints the answer followed by the numbered evidence it was
    /// generated from.
    Query {
        /// The question to answer.
        question: String,

        /// Number of chunks to retrieve (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the answer and sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show how a source would be chunked, without touching the store.
    Chunks {
        /// File, directory, or URI to split.
        source: String,

        /// Export mode: `plain_text` or `structured`.
        #[arg(long)]
        export_mode: Option<ExportMode>,
    },

    /// Show store statistics.
    Stats,
}

fn resolve_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                config::load_config(default)
            } else {
                Ok(Config::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init()
        .ok();

    let cfg = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            source,
            export_mode,
            overwrite,
            append,
            dry_run,
        } => {
            let opts = IngestOptions {
                export_mode,
                overwrite: match (overwrite, append) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                dry_run,
            };
            pipeline::run_ingest(&cfg, &source, &opts).await?;
        }
        Commands::Query {
            question,
            top_k,
            json,
        } => {
            pipeline::run_query(&cfg, &question, top_k, json).await?;
        }
        Commands::Chunks {
            source,
            export_mode,
        } => {
            pipeline::run_chunks(&cfg, &source, export_mode).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
