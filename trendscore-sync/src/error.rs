//! Error types for trendscore-sync
//!
//! Each layer has its own error enum; `SyncError` is what a run returns.
//! Fetch and scoring errors pass through unchanged so the caller reports
//! the original cause.

use crate::notifier::NotifyError;
use crate::scoring::ScoringError;
use crate::sources::FetchError;
use thiserror::Error;

/// Result type for reconciliation runs
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or malformed input detected before any fetch or commit
    #[error("Configuration error: {0}")]
    Config(String),

    /// Score store failure
    #[error(transparent)]
    Store(#[from] trendscore_common::Error),

    /// Batch fetch failed terminally or exhausted its retries
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Scoring engine failed
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    /// Notification transport failure (only surfaced by direct notifier use)
    #[error(transparent)]
    Notify(#[from] NotifyError),
}
