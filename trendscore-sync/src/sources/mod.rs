//! External signal sources
//!
//! A source answers one request (series × inclusive day range) with the
//! points it has. Errors say whether retrying can help.

pub mod csv_import;
pub mod google_trends;
pub mod ngram_archive;

pub use google_trends::GoogleTrendsSource;
pub use ngram_archive::NgramArchiveSource;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use trendscore_common::db::InputSeries;

/// One fetch request
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub series: &'a [InputSeries],
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A value returned by a source, not yet matched to a stored series
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePoint {
    pub series_name: String,
    pub region: Option<String>,
    pub day: NaiveDate,
    pub value: f64,
}

/// Fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    /// Source asked us to slow down (quota or throttling)
    #[error("Rate limited by source: {0}")]
    RateLimited(String),

    /// Network or server-side failure
    #[error("Transient fetch failure: {0}")]
    Transient(String),

    /// Source rejected the request itself
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Response could not be understood
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Source lacks the settings it needs to send a request
    #[error("Source not configured: {0}")]
    NotConfigured(String),

    #[error("Fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether a later attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FetchError::RateLimited(_) | FetchError::Transient(_))
    }
}

/// A remote or local provider of daily series values
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Name recorded in the fetch log
    fn name(&self) -> &str;

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<SourcePoint>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(FetchError::RateLimited("429".into()).is_recoverable());
        assert!(FetchError::Transient("reset".into()).is_recoverable());
        assert!(!FetchError::BadRequest("400".into()).is_recoverable());
        assert!(!FetchError::Malformed("not json".into()).is_recoverable());
        assert!(!FetchError::NotConfigured("no key".into()).is_recoverable());

        let exhausted = FetchError::RetriesExhausted {
            attempts: 5,
            last: Box::new(FetchError::Transient("reset".into())),
        };
        assert!(!exhausted.is_recoverable());
    }
}
