//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and brings the schema up
//! to date. Every statement is idempotent, so this runs on every start.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open the database at `db_path`, creating file, directories and tables
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets readers proceed while a run holds its write transaction
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create all tables (no-op for tables that already exist)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_models_table(pool).await?;
    create_input_series_table(pool).await?;
    create_model_series_table(pool).await?;
    create_raw_points_table(pool).await?;
    create_model_scores_table(pool).await?;
    create_fetch_log_table(pool).await?;
    Ok(())
}

async fn create_models_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS models (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL CHECK (kind IN ('search', 'ngram', 'csv')),
            public INTEGER NOT NULL DEFAULT 0,
            scoring_function TEXT,
            window_size INTEGER CHECK (window_size IS NULL OR window_size > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_input_series_table(pool: &SqlitePool) -> Result<()> {
    // region is '' for search terms so the unique key also covers them
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS input_series (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            region TEXT NOT NULL DEFAULT '',
            UNIQUE (name, region)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_model_series_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_series (
            model_id INTEGER NOT NULL REFERENCES models(id) ON DELETE CASCADE,
            series_id INTEGER NOT NULL REFERENCES input_series(id) ON DELETE CASCADE,
            PRIMARY KEY (model_id, series_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_raw_points_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_points (
            series_id INTEGER NOT NULL REFERENCES input_series(id) ON DELETE CASCADE,
            day TEXT NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (series_id, day)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_model_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_scores (
            model_id INTEGER NOT NULL REFERENCES models(id) ON DELETE CASCADE,
            region TEXT NOT NULL,
            day TEXT NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (model_id, region, day)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_fetch_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fetch_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            day TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            run_id TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
