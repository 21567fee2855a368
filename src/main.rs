//! bookdump: load Open Library dumps and JSON book samples into a document store

mod commands;

use anyhow::Result;
use bookdump::config::{Config, LogFormat};
use bookdump::import::UnresolvedAuthors;
use clap::{Parser, Subcommand};
use commands::ingest::IngestArgs;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "bookdump")]
#[command(about = "Ingest Open Library dumps and JSON book samples into a document store")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to ./bookdump.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a JSON sample or an authors + works dump pair
    Ingest {
        /// JSON array or JSON Lines file with book objects
        #[arg(long, conflicts_with_all = ["authors", "works"])]
        json_sample: Option<PathBuf>,

        /// Open Library authors dump
        #[arg(long, requires = "works")]
        authors: Option<PathBuf>,

        /// Open Library works dump
        #[arg(long, requires = "authors")]
        works: Option<PathBuf>,

        /// Database name
        #[arg(long)]
        db: Option<String>,

        /// Collection name
        #[arg(long)]
        collection: Option<String>,

        /// Documents per upsert batch
        #[arg(long)]
        batch: Option<usize>,

        /// Maximum author lines to scan
        #[arg(long)]
        authors_scan_limit: Option<u64>,

        /// Maximum work documents to ingest
        #[arg(long)]
        works_limit: Option<u64>,

        /// Unresolved author keys: drop or placeholder
        #[arg(long)]
        unresolved_authors: Option<UnresolvedAuthors>,

        /// Skip works without any resolved author
        #[arg(long)]
        skip_unattributed: bool,

        /// Drop the target collection first
        #[arg(long)]
        drop: bool,

        /// Count and spot-check the collection afterwards
        #[arg(long)]
        verify_after: bool,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Quiet mode (no progress output)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Search the collection by title text or author
    Query {
        /// Words to match against titles
        #[arg(long, conflicts_with = "author", required_unless_present = "author")]
        title: Option<String>,

        /// Exact author name
        #[arg(long)]
        author: Option<String>,

        /// Database name
        #[arg(long)]
        db: Option<String>,

        /// Collection name
        #[arg(long)]
        collection: Option<String>,

        /// Number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output format (text, json, jsonl)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show collection statistics
    Stats {
        /// Database name
        #[arg(long)]
        db: Option<String>,

        /// Collection name
        #[arg(long)]
        collection: Option<String>,

        /// Documents to print
        #[arg(long, default_value = "1")]
        sample: usize,
    },

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(config: &Config, verbose: u8) -> Result<()> {
    let level = config.logging.effective_level(verbose);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    match config.logging.format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(config.logging.ansi)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

/// Apply `--db` / `--collection` overrides
fn target(config: &mut Config, db: Option<String>, collection: Option<String>) -> Result<()> {
    if let Some(db) = db {
        config.store.database = db;
    }
    if let Some(collection) = collection {
        config.store.collection = collection;
    }
    config.validate()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;

    // Override data dir if specified
    if let Some(data_dir) = cli.data_dir {
        config.store.data_dir = data_dir;
    }

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Ingest {
            json_sample,
            authors,
            works,
            db,
            collection,
            batch,
            authors_scan_limit,
            works_limit,
            unresolved_authors,
            skip_unattributed,
            drop,
            verify_after,
            report,
            quiet,
        } => {
            target(&mut config, db, collection)?;
            let args = IngestArgs {
                json_sample,
                authors,
                works,
                batch,
                authors_scan_limit,
                works_limit,
                unresolved_authors,
                skip_unattributed,
                drop,
                verify_after,
                report,
                quiet,
            };
            commands::ingest::run_ingest(config, args).await?;
        }

        Commands::Query {
            title,
            author,
            db,
            collection,
            limit,
            format,
        } => {
            target(&mut config, db, collection)?;
            commands::query::run_query(config, title, author, limit, format).await?;
        }

        Commands::Stats {
            db,
            collection,
            sample,
        } => {
            target(&mut config, db, collection)?;
            commands::stats::show_stats(config, sample).await?;
        }

        Commands::Init { path, force } => {
            commands::init::init_config(path, force).await?;
        }
    }

    Ok(())
}
