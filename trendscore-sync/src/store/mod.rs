//! Keyed storage for raw points and computed scores
//!
//! Writes are staged until `commit`; reads made through the same store see
//! staged writes.

mod sqlite;

pub use sqlite::SqliteScoreStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use trendscore_common::db::{ComputedScore, FetchLogEntry, InputSeries, Model, RawPoint};
use trendscore_common::Result;

/// Durable keyed score store consumed by the reconciliation engine
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Days with a raw point for `series`
    async fn known_days(&self, series: &InputSeries) -> Result<BTreeSet<NaiveDate>>;

    /// Days with a computed score for `model` in `region`
    async fn known_score_days(&self, model: &Model, region: &str) -> Result<BTreeSet<NaiveDate>>;

    /// Raw points for `series` in `from..=to`, ascending by day
    async fn window_points(
        &self,
        series: &InputSeries,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawPoint>>;

    /// Insert or overwrite the point keyed by (series, day)
    async fn upsert_raw_point(&self, point: &RawPoint) -> Result<()>;

    /// Insert or overwrite the score keyed by (model, region, day)
    async fn upsert_score(&self, score: &ComputedScore) -> Result<()>;

    /// Append a fetch-log entry
    async fn record_fetch(&self, entry: &FetchLogEntry) -> Result<()>;

    /// Make every staged write durable
    async fn commit(&self) -> Result<()>;
}
