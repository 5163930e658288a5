//! trendscore-sync - Incremental score reconciliation CLI
//!
//! Brings one model's stored scores up to date for a date range. Scheduling
//! is external; each invocation is one synchronous run.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use trendscore_common::config::load_config;
use trendscore_common::db::init_database;
use trendscore_common::db::models::{latest_score_day, list_models, load_model};
use trendscore_common::logging::init_tracing;
use trendscore_common::time::{format_day, parse_day, shift_days, today};
use trendscore_sync::config::{apply_env_overrides, assemble_engine};
use trendscore_sync::store::SqliteScoreStore;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "trendscore-sync")]
#[command(about = "Incremental reconciliation of trend-based model scores")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "TRENDSCORE_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the SQLite database (overrides the config file)
    #[arg(short, long, env = "TRENDSCORE_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the database schema
    InitDb,

    /// List all models
    ListModels,

    /// Collect missing data and score a model over a date range
    RunModel {
        model_id: i64,

        /// First day to score, YYYY-MM-DD (defaults to the day after the latest score)
        #[arg(short, long)]
        start: Option<String>,

        /// Last day to score, YYYY-MM-DD (defaults to two days ago)
        #[arg(short, long)]
        end: Option<String>,

        /// CSV file with scores (CSV models only)
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

/// Resolve and validate the run range
fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
    latest_score: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    let start = match start {
        Some(s) => parse_day(s)?,
        None => match latest_score {
            Some(day) => shift_days(day, 1)?,
            None => bail!("Model has no scores yet; pass --start"),
        },
    };
    let end = match end {
        Some(s) => parse_day(s)?,
        None => shift_days(today, -2)?,
    };

    if start > end {
        bail!("Start must be before end");
    }
    if end >= today {
        bail!("End must be in the past");
    }
    Ok((start, end))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    init_tracing(&config.logging)?;

    info!(
        "Starting trendscore-sync v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    apply_env_overrides(&mut config)?;

    let db_path = args
        .database
        .clone()
        .unwrap_or_else(|| config.database_path_or_default());
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path).await?;

    match args.command {
        Command::InitDb => {
            info!("✓ Database initialized");
        }
        Command::ListModels => {
            for model in list_models(&pool).await? {
                println!(
                    "{}) {} ({})",
                    model.id,
                    model.name,
                    if model.public { "Public" } else { "Private" }
                );
            }
        }
        Command::RunModel {
            model_id,
            start,
            end,
            csv,
        } => {
            let model = load_model(&pool, model_id)
                .await?
                .with_context(|| format!("Could not find model with ID {}", model_id))?;

            let latest = latest_score_day(&pool, model.id).await?;
            let (start, end) = resolve_range(start.as_deref(), end.as_deref(), latest, today())?;

            let raw_input = match &csv {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read CSV file {}", path.display()))?,
                ),
                None => None,
            };

            let store = Arc::new(SqliteScoreStore::new(pool.clone()));
            let engine = assemble_engine(&model, &config, store)?;
            let report = engine
                .run(&model, start, end, raw_input.as_deref())
                .await?;

            info!(
                "Run {} finished: {} batches, {} points, {} scores",
                report.run_id, report.batches_fetched, report.points_upserted, report.scores_computed
            );
            if let Some((day, value)) = report.latest_score {
                info!("Latest score {} = {}", format_day(day), value);
            }
        }
    }

    pool.close().await;
    Ok(())
}
