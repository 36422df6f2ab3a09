//! sbir-detect - SBIR transition detector
//!
//! Loads award and contract exports into SQLite and links Phase II awards to
//! the federal contracts that most plausibly commercialized them. Every
//! command prints a JSON summary to stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sbir_common::db::init::init_database;
use sbir_common::Config;
use sbir_detect::detection::DetectionCoordinator;
use sbir_detect::ingest::{read_rows_jsonl, Ingestor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sbir-detect
#[derive(Parser, Debug)]
#[command(name = "sbir-detect")]
#[command(about = "Detect SBIR award transitions into federal contracts")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SBIR_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config and SBIR_DATABASE_PATH)
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest award rows from a JSON Lines file
    IngestAwards { file: PathBuf },

    /// Ingest contract rows from a JSON Lines file
    IngestContracts { file: PathBuf },

    /// Run detection over pending awards
    Detect {
        /// Single worker on a pooled connection
        #[arg(long)]
        sequential: bool,

        /// Evidence artifact directory (overrides output.evidence_dir)
        #[arg(long)]
        evidence_dir: Option<PathBuf>,
    },

    /// Print table counts
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("sbir-detect {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    let output = match args.command {
        Command::IngestAwards { file } => {
            let rows = read_input(&file)?;
            let stats = Ingestor::new(pool.clone(), config.ingest.chunk_size)?
                .ingest_awards(&rows)
                .await
                .context("Award ingestion failed")?;
            serde_json::to_value(&stats)?
        }
        Command::IngestContracts { file } => {
            let rows = read_input(&file)?;
            let stats = Ingestor::new(pool.clone(), config.ingest.chunk_size)?
                .ingest_contracts(&rows)
                .await
                .context("Contract ingestion failed")?;
            serde_json::to_value(&stats)?
        }
        Command::Detect {
            sequential,
            evidence_dir,
        } => {
            let mut coordinator = DetectionCoordinator::new(
                pool.clone(),
                config.database_path.clone(),
                Arc::new(config.detection.clone()),
            )
            .with_evidence_dir(evidence_dir.or(config.output.evidence_dir.clone()));

            let summary = if sequential {
                coordinator.run_sequential().await
            } else {
                coordinator.run().await
            }
            .context("Detection run failed")?;
            serde_json::to_value(&summary)?
        }
        Command::Summary => {
            let summary = sbir_detect::db::store_summary(&pool)
                .await
                .context("Failed to read table counts")?;
            serde_json::to_value(&summary)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    pool.close().await;
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<sbir_common::db::models::RawRecord>> {
    read_rows_jsonl(path).with_context(|| format!("Failed to read {}", path.display()))
}
