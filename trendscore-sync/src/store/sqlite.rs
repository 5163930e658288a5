//! SQLite score store
//!
//! The first write after a commit opens a transaction; `commit` closes it.
//! Reads run inside the open transaction when there is one so they observe
//! staged writes. Dropping the store with staged writes rolls them back.

use super::ScoreStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use trendscore_common::db::{ComputedScore, FetchLogEntry, InputSeries, Model, RawPoint};
use trendscore_common::Result;

const KNOWN_DAYS_SQL: &str = "SELECT day FROM raw_points WHERE series_id = ?";

const KNOWN_SCORE_DAYS_SQL: &str = "SELECT day FROM model_scores WHERE model_id = ? AND region = ?";

const WINDOW_POINTS_SQL: &str = r#"
    SELECT series_id, day, value FROM raw_points
    WHERE series_id = ? AND day >= ? AND day <= ?
    ORDER BY day
"#;

/// Score store backed by the shared SQLite database
pub struct SqliteScoreStore {
    pool: SqlitePool,
    staged: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteScoreStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            staged: Mutex::new(None),
        }
    }

    async fn execute_staged<'q>(&self, query: Query<'q, Sqlite, SqliteArguments<'q>>) -> Result<()> {
        let mut guard = self.staged.lock().await;
        let tx = match guard.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        let tx = guard.insert(tx);
        query.execute(&mut **tx).await?;
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for SqliteScoreStore {
    async fn known_days(&self, series: &InputSeries) -> Result<BTreeSet<NaiveDate>> {
        let mut guard = self.staged.lock().await;
        let days: Vec<NaiveDate> = match guard.as_mut() {
            Some(tx) => {
                sqlx::query_scalar(KNOWN_DAYS_SQL)
                    .bind(series.id)
                    .fetch_all(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query_scalar(KNOWN_DAYS_SQL)
                    .bind(series.id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(days.into_iter().collect())
    }

    async fn known_score_days(&self, model: &Model, region: &str) -> Result<BTreeSet<NaiveDate>> {
        let mut guard = self.staged.lock().await;
        let days: Vec<NaiveDate> = match guard.as_mut() {
            Some(tx) => {
                sqlx::query_scalar(KNOWN_SCORE_DAYS_SQL)
                    .bind(model.id)
                    .bind(region)
                    .fetch_all(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query_scalar(KNOWN_SCORE_DAYS_SQL)
                    .bind(model.id)
                    .bind(region)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(days.into_iter().collect())
    }

    async fn window_points(
        &self,
        series: &InputSeries,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawPoint>> {
        let mut guard = self.staged.lock().await;
        let rows = match guard.as_mut() {
            Some(tx) => {
                sqlx::query(WINDOW_POINTS_SQL)
                    .bind(series.id)
                    .bind(from)
                    .bind(to)
                    .fetch_all(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query(WINDOW_POINTS_SQL)
                    .bind(series.id)
                    .bind(from)
                    .bind(to)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| RawPoint {
                series_id: row.get("series_id"),
                day: row.get("day"),
                value: row.get("value"),
            })
            .collect())
    }

    async fn upsert_raw_point(&self, point: &RawPoint) -> Result<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO raw_points (series_id, day, value) VALUES (?, ?, ?)
            ON CONFLICT(series_id, day) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(point.series_id)
        .bind(point.day)
        .bind(point.value);
        self.execute_staged(query).await
    }

    async fn upsert_score(&self, score: &ComputedScore) -> Result<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO model_scores (model_id, region, day, value) VALUES (?, ?, ?, ?)
            ON CONFLICT(model_id, region, day) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(score.model_id)
        .bind(score.region.clone())
        .bind(score.day)
        .bind(score.value);
        self.execute_staged(query).await
    }

    async fn record_fetch(&self, entry: &FetchLogEntry) -> Result<()> {
        let query = sqlx::query(
            "INSERT INTO fetch_log (source, day, fetched_at, run_id) VALUES (?, ?, ?, ?)",
        )
        .bind(entry.source.clone())
        .bind(entry.day)
        .bind(entry.fetched_at)
        .bind(entry.run_id.to_string());
        self.execute_staged(query).await
    }

    async fn commit(&self) -> Result<()> {
        let mut guard = self.staged.lock().await;
        if let Some(tx) = guard.take() {
            tx.commit().await?;
            tracing::debug!("Committed staged score store writes");
        }
        Ok(())
    }
}
