//! Rate-limited batch fetching
//!
//! Runs one batch against a source with bounded retries. After failed
//! attempt `n` (from 1) a recoverable error sleeps `unit * base^n` before
//! the next attempt; with the defaults that is 3, 9, 27 and 81 seconds.
//! Terminal errors are returned immediately.

use crate::batcher::Batch;
use crate::sources::{FetchError, FetchRequest, SignalSource, SourcePoint};
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use trendscore_common::config::RetryConfig;
use trendscore_common::db::RawPoint;
use trendscore_common::time::days_inclusive;

/// Attempt budget and backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    /// Sleep after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(self.backoff_base.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            backoff_unit: Duration::from_millis(config.backoff_unit_ms),
        }
    }
}

/// Points of one fetched batch
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub points: Vec<RawPoint>,
    /// Days the source answered for, with or without points
    pub fetched_days: BTreeSet<NaiveDate>,
    pub attempts: u32,
}

/// Executes batches against a `SignalSource`
pub struct RateLimitedFetcher {
    source: Arc<dyn SignalSource>,
    policy: RetryPolicy,
    pacer: Option<DefaultDirectRateLimiter>,
}

impl RateLimitedFetcher {
    pub fn new(source: Arc<dyn SignalSource>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            pacer: None,
        }
    }

    /// Space successive requests at least `interval` apart
    ///
    /// A zero interval leaves requests unpaced.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.pacer = Quota::with_period(interval).map(RateLimiter::direct);
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch one batch
    pub async fn fetch(&self, batch: &Batch) -> Result<BatchOutcome, FetchError> {
        let request = FetchRequest {
            series: &batch.series,
            start: batch.start,
            end: batch.end,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            if let Some(pacer) = &self.pacer {
                pacer.until_ready().await;
            }

            match self.source.fetch(&request).await {
                Ok(points) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Batch fetch succeeded after retry");
                    }
                    return Ok(resolve_points(batch, points, attempt));
                }
                Err(err) if !err.is_recoverable() => {
                    tracing::error!(
                        source = self.source.name(),
                        attempt,
                        error = %err,
                        "Batch fetch failed with terminal error"
                    );
                    return Err(err);
                }
                Err(err) if attempt >= self.policy.max_attempts => {
                    tracing::error!(
                        source = self.source.name(),
                        attempt,
                        error = %err,
                        "Batch fetch failed: retries exhausted"
                    );
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        source = self.source.name(),
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "Fetch error, sleeping before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Match source points to the batch's series
///
/// A successful answer covers every day of the batch, even days that came
/// back empty. Points for series the batch did not ask for, or outside its
/// range, are dropped.
fn resolve_points(batch: &Batch, points: Vec<SourcePoint>, attempts: u32) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        points: Vec::with_capacity(points.len()),
        fetched_days: days_inclusive(batch.start, batch.end).collect(),
        attempts,
    };

    for point in points {
        let series = batch
            .series
            .iter()
            .find(|s| s.name == point.series_name && s.region == point.region);

        let Some(series) = series else {
            tracing::warn!(
                series = %point.series_name,
                region = point.region.as_deref().unwrap_or("-"),
                "Dropping point for series outside the batch"
            );
            continue;
        };
        if point.day < batch.start || point.day > batch.end {
            tracing::warn!(series = %point.series_name, day = %point.day, "Dropping point outside the batch range");
            continue;
        }

        outcome.points.push(RawPoint {
            series_id: series.id,
            day: point.day,
            value: point.value,
        });
    }

    outcome
}
