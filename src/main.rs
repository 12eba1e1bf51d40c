//! # Recall Index CLI (`recall`)
//!
//! The `recall` binary drives the retrieval core: schema setup, indexing a
//! source, previewing segmentation, embedding backfills and coverage stats.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and run schema migrations |
//! | `recall ingest <file>` | Store a file as a source, segment it and embed its chunks |
//! | `recall chunk <file>` | Print how a file would be segmented (no database) |
//! | `recall embed pending` | Embed chunks whose embedding is missing |
//! | `recall embed chunks` | Segment sources that have no chunks yet |
//! | `recall embed summaries` | Embed source summaries whose embedding is missing |
//! | `recall embed regenerate <id>` | Re-segment and re-embed one source |
//! | `recall stats` | Show embedding coverage |
//! | `recall score` | Combine a semantic and a keyword score |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! recall init
//!
//! # Index a PDF extracted to text, with page markers
//! recall ingest paper.txt --content-type pdf --owner alice
//!
//! # See what a backfill would pick up without touching anything
//! recall embed pending --dry-run
//!
//! # Backfill at most 200 chunks for one owner
//! recall embed pending --owner alice --limit 200
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` for per-request detail.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use recall_index::backfill::BackfillOptions;
use recall_index::embed_cmd::{self, EmbedTarget};
use recall_index::ingest::{self, IngestRequest};
use recall_index::{config, migrate, search, stats};

/// Recall Index CLI: semantic retrieval core for a personal knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Only `[db]` is required; every other section has defaults.
#[derive(Parser)]
#[command(
    name = "recall",
    about = "Recall Index: segmentation, embeddings and hybrid scoring for a personal knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/recall.toml`.
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `sources` and `chunks`
    /// tables. Idempotent.
    Init,

    /// Store a text file as a source and index it.
    ///
    /// Existing chunks of the same source id are deleted and recreated.
    /// Chunks are embedded inline when a provider is configured; failures
    /// are left for `recall embed pending`.
    Ingest {
        /// Path to the already-extracted text.
        file: PathBuf,

        /// One of `pdf`, `url`, `text`, `note`, `image`.
        #[arg(long, default_value = "text")]
        content_type: String,

        /// Owner of the source.
        #[arg(long)]
        owner: String,

        /// Source id to replace. A new UUID is generated when omitted.
        #[arg(long)]
        id: Option<String>,

        /// Summary text to store alongside the source.
        #[arg(long)]
        summary: Option<String>,

        /// Store chunks without embedding them.
        #[arg(long)]
        no_embed: bool,
    },

    /// Segment a file and print the chunks without storing anything.
    Chunk {
        /// Path to the text to segment.
        file: PathBuf,

        /// One of `pdf`, `url`, `text`, `note`, `image`.
        #[arg(long, default_value = "text")]
        content_type: String,

        /// Print chunks as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Backfill chunks and embeddings.
    ///
    /// Requires an embedding provider unless `--dry-run` is given.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Show embedding coverage for chunks and summaries.
    Stats {
        /// Restrict to one owner.
        #[arg(long)]
        owner: Option<String>,
    },

    /// Compute a hybrid score from a semantic and a keyword score.
    ///
    /// Weights default to `[retrieval]` in config.
    Score {
        #[arg(long)]
        semantic: Option<f64>,

        #[arg(long)]
        keyword: Option<f64>,

        #[arg(long)]
        semantic_weight: Option<f64>,

        #[arg(long)]
        keyword_weight: Option<f64>,
    },
}

/// Shared flags of the backfill subcommands.
#[derive(clap::Args)]
struct BackfillArgs {
    /// Restrict to one owner.
    #[arg(long)]
    owner: Option<String>,

    /// Override the batch size from config.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum number of items to process in this run.
    #[arg(long)]
    limit: Option<usize>,

    /// Count candidates without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Include items that already have an embedding.
    #[arg(long)]
    all: bool,
}

impl BackfillArgs {
    fn options(self) -> BackfillOptions {
        BackfillOptions {
            dry_run: self.dry_run,
            owner_id: self.owner,
            batch_size: self.batch_size,
            skip_existing: !self.all,
            limit: self.limit,
        }
    }
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks whose embedding is missing.
    Pending(BackfillArgs),

    /// Segment (and embed) sources that have no chunks.
    Chunks(BackfillArgs),

    /// Embed source summaries whose embedding is missing.
    Summaries(BackfillArgs),

    /// Delete and recreate all chunks of one source, then embed them.
    Regenerate {
        /// Source id.
        source_id: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            content_type,
            owner,
            id,
            summary,
            no_embed,
        } => {
            let req = IngestRequest {
                path: &file,
                content_type: &content_type,
                owner_id: &owner,
                source_id: id.as_deref(),
                summary: summary.as_deref(),
                no_embed,
            };
            ingest::run_ingest(&cfg, &req).await?;
        }
        Commands::Chunk {
            file,
            content_type,
            json,
        } => {
            ingest::run_chunk_preview(&cfg.segmenter, &file, &content_type, json)?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending(args) => {
                embed_cmd::run_embed(&cfg, EmbedTarget::Pending, &args.options()).await?;
            }
            EmbedAction::Chunks(args) => {
                embed_cmd::run_embed(&cfg, EmbedTarget::Chunks, &args.options()).await?;
            }
            EmbedAction::Summaries(args) => {
                embed_cmd::run_embed(&cfg, EmbedTarget::Summaries, &args.options()).await?;
            }
            EmbedAction::Regenerate { source_id } => {
                embed_cmd::run_regenerate(&cfg, &source_id).await?;
            }
        },
        Commands::Stats { owner } => {
            stats::run_stats(&cfg, owner.as_deref()).await?;
        }
        Commands::Score {
            semantic,
            keyword,
            semantic_weight,
            keyword_weight,
        } => {
            search::run_score(&cfg, semantic, keyword, semantic_weight, keyword_weight)?;
        }
    }

    Ok(())
}
