//! Database schema migrations
//!
//! `create_schema` produces the table layout; migrations layer changes on
//! top of it and record progress in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. Never modify an existing migration
//! 2. Every migration is idempotent (check before altering)
//! 3. Prefer `ALTER TABLE` / `CREATE INDEX IF NOT EXISTS` over rebuilds

use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Current schema version
///
/// Increment this when adding a migration.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Get current schema version (0 when never recorded)
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    create_schema_version_table(pool).await?;

    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current = get_schema_version(pool).await?;

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!(
        "Migrating database schema from v{} to v{}",
        current, CURRENT_SCHEMA_VERSION
    );

    if current < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    Ok(())
}

/// v1: baseline day-range indexes
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fetch_log_day ON fetch_log (day)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_model_scores_day ON model_scores (model_id, day)")
        .execute(pool)
        .await?;
    info!("Migration v1: added day indexes");
    Ok(())
}
