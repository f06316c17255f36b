//! # codesim CLI
//!
//! ```bash
//! codesim [--config codesim.toml] <FILE>     # index a .py/.java file
//! codesim inspect [--limit N] [--id ID]      # show stored items
//! codesim search "<text>" [-k N]             # free-text similarity search
//! ```
//!
//! Exit codes: `0` success, `1` config/other, `2` usage, `3` file not found,
//! `4` unsupported file type, `5` missing credential, `6` embedding failure,
//! `7` store failure.

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use codesim::config::{self, Config};
use codesim::embedding;
use codesim::models::WriteMode;
use codesim::pipeline::{self, IndexOptions};
use codesim::store::VectorStore;
use codesim::{inspect, search, IndexError};

/// codesim: index Python/Java declarations as embeddings and find similar code.
#[derive(Parser)]
#[command(
    name = "codesim",
    version,
    about = "Index Python/Java declarations as embeddings and find similar code",
    long_about = "Parses one .py or .java file, extracts its functions, methods, and constructors \
    with tree-sitter, embeds their source through a hosted embedding API, stores the vectors in a \
    local collection, and prints each declaration's nearest neighbors."
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./codesim.toml")]
    config: PathBuf,

    /// Override `[db].path`, the directory holding the collection.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override `[db].collection`.
    #[arg(long, global = true)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    index: IndexArgs,
}

/// Arguments for the default (index a file) command.
#[derive(Args)]
struct IndexArgs {
    /// Source file to index (`.py` or `.java`).
    file: Option<PathBuf>,

    /// Write mode: `upsert` replaces existing ids, `insert` rejects them.
    #[arg(long)]
    mode: Option<WriteMode>,

    /// Neighbors to fetch per declaration (the declaration itself included).
    #[arg(short = 'k', long)]
    neighbors: Option<usize>,

    /// Only extract and print declarations; no embedding, no store.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the collection size and stored items.
    Inspect {
        /// Maximum number of items to list.
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Print a single item in full.
        #[arg(long)]
        id: Option<String>,
    },

    /// Embed a free-text query and list the nearest stored declarations.
    Search {
        query: String,

        /// Number of results.
        #[arg(short = 'k', long, default_value_t = 5)]
        neighbors: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<IndexError>()
                .map_or(1, IndexError::exit_code);
            tracing::debug!(code, "run failed");
            eprintln!("[error] {err:#}");
            ExitCode::from(code)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CODESIM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = config::load_config(&cli.config)
        .map_err(|e| IndexError::Config(format!("{e:#}")))?;
    if let Some(dir) = cli.data_dir {
        cfg.db.path = dir;
    }
    if let Some(collection) = cli.collection {
        cfg.db.collection = collection;
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Some(Commands::Inspect { limit, id }) => {
            let store = open_store(&cfg).await?;
            let result = match id {
                Some(id) => inspect::show(&store, &id, &mut out).await,
                None => inspect::run(&store, limit, &mut out).await.map(|_| ()),
            };
            store.close().await;
            result?;
        }
        Some(Commands::Search { query, neighbors }) => {
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let store = open_store(&cfg).await?;
            let result = search::run(&query, neighbors, embedder.as_ref(), &store, &mut out).await;
            store.close().await;
            result?;
        }
        None => {
            let Some(file) = cli.index.file else {
                Cli::command()
                    .error(
                        clap::error::ErrorKind::MissingRequiredArgument,
                        "a source file (.py or .java) or a subcommand is required",
                    )
                    .exit();
            };

            if cli.index.dry_run {
                pipeline::extract_file(&file, &mut out)?;
                return Ok(());
            }

            let options = IndexOptions {
                write_mode: cli.index.mode.unwrap_or(cfg.query.write_mode),
                neighbors: cli.index.neighbors.unwrap_or(cfg.query.neighbors),
            };

            // credential problems surface before any file is touched
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let store = open_store(&cfg).await?;
            let result =
                pipeline::index_file(&file, embedder.as_ref(), &store, &options, &mut out).await;
            store.close().await;

            let summary = result?;
            tracing::info!(
                file = %file.display(),
                declarations = summary.declarations,
                inserted = summary.stats.inserted,
                replaced = summary.stats.replaced,
                "indexing finished"
            );
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> Result<VectorStore, IndexError> {
    VectorStore::open(&cfg.db.path, &cfg.db.collection).await
}
