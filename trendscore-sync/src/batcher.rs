//! Request batching under server-side size limits
//!
//! Series are chunked into groups of at most `max_series_per_batch`. Each
//! chunk's date range is cut into contiguous inclusive sub-ranges of
//! `max_points_per_batch / chunk_len` days (at least one); the last
//! sub-range takes the remainder. Batches for one chunk cover the chunk ×
//! range cross-product exactly once.

use chrono::{Days, NaiveDate};
use trendscore_common::config::BatchingConfig;
use trendscore_common::db::InputSeries;

/// Per-request limits imposed by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_series_per_batch: usize,
    pub max_points_per_batch: usize,
}

impl BatchLimits {
    /// Days per sub-range for a chunk of `chunk_len` series
    pub fn span_for(&self, chunk_len: usize) -> u64 {
        let span = self.max_points_per_batch / chunk_len.max(1);
        u64::try_from(span.max(1)).unwrap_or(u64::MAX)
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        BatchLimits::from(&BatchingConfig::default())
    }
}

impl From<&BatchingConfig> for BatchLimits {
    fn from(config: &BatchingConfig) -> Self {
        Self {
            max_series_per_batch: config.max_series_per_batch.max(1),
            max_points_per_batch: config.max_points_per_batch.max(1),
        }
    }
}

/// One unit of fetch work: a series subset over an inclusive day range
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub series: Vec<InputSeries>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Lazy batch sequence
///
/// Consumed once; create a new one to batch again.
pub struct Batches<'a> {
    chunks: std::slice::Chunks<'a, InputSeries>,
    current: Option<&'a [InputSeries]>,
    /// Next sub-range start in the current chunk, `None` once it is done
    cursor: Option<NaiveDate>,
    start: NaiveDate,
    end: NaiveDate,
    limits: BatchLimits,
}

/// Batch `series` over `start..=end`
pub fn batches(
    series: &[InputSeries],
    start: NaiveDate,
    end: NaiveDate,
    limits: BatchLimits,
) -> Batches<'_> {
    Batches {
        chunks: series.chunks(limits.max_series_per_batch.max(1)),
        current: None,
        cursor: None,
        start,
        end,
        limits,
    }
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.start > self.end {
            return None;
        }

        loop {
            if let (Some(chunk), Some(cursor)) = (self.current, self.cursor) {
                let span = self.limits.span_for(chunk.len());
                let last = cursor
                    .checked_add_days(Days::new(span - 1))
                    .map_or(self.end, |day| day.min(self.end));
                self.cursor = if last < self.end { last.succ_opt() } else { None };
                return Some(Batch {
                    series: chunk.to_vec(),
                    start: cursor,
                    end: last,
                });
            }

            self.current = Some(self.chunks.next()?);
            self.cursor = Some(self.start);
        }
    }
}
