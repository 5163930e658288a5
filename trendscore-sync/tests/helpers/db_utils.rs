//! Database Test Utilities

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use trendscore_common::db::init_database;
use trendscore_common::db::models::{add_series_to_model, insert_model, load_model};
use trendscore_common::db::{Model, ModelKind, ModelSettings};
use trendscore_sync::store::SqliteScoreStore;

/// Create a temporary database and a score store over it
///
/// Returns (TempDir, SqlitePool, store) - TempDir must be kept alive for duration of test
pub async fn create_test_store() -> Result<(TempDir, SqlitePool, Arc<SqliteScoreStore>)> {
    let temp_dir = TempDir::new()?;
    let pool = init_database(&temp_dir.path().join("test_trendscore.db")).await?;
    let store = Arc::new(SqliteScoreStore::new(pool.clone()));
    Ok((temp_dir, pool, store))
}

/// Insert a model with its series and load it back
///
/// `series` holds (name, region) pairs. CSV models ignore `window`.
pub async fn seed_model(
    pool: &SqlitePool,
    name: &str,
    kind: ModelKind,
    window: u32,
    series: &[(&str, Option<&str>)],
) -> Result<Model> {
    let settings = if kind.is_fetched() {
        Some(ModelSettings::new("gp_model", window)?)
    } else {
        None
    };
    let model_id = insert_model(pool, name, kind, false, settings.as_ref()).await?;
    for (series_name, region) in series {
        add_series_to_model(pool, model_id, series_name, *region).await?;
    }
    Ok(load_model(pool, model_id).await?.expect("model just inserted"))
}

/// Store `value` for `series_id` on each of `days`
pub async fn seed_raw_points(
    pool: &SqlitePool,
    series_id: i64,
    days: &[NaiveDate],
    value: f64,
) -> Result<()> {
    for day in days {
        sqlx::query("INSERT INTO raw_points (series_id, day, value) VALUES (?, ?, ?)")
            .bind(series_id)
            .bind(*day)
            .bind(value)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Row count of `table`
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
