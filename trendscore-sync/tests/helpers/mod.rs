//! Test Helper Utilities
//!
//! Shared utilities for testing trendscore-sync

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;

pub use db_utils::{count_rows, create_test_store, seed_model, seed_raw_points};
pub use fakes::{FakeEngine, FakeSource, RecordingNotifier};

use chrono::NaiveDate;
use std::time::Duration;
use trendscore_sync::fetcher::RetryPolicy;

/// `2020-01-<day>`
pub fn day(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
}

/// Retry policy with millisecond backoff
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_base: 2,
        backoff_unit: Duration::from_millis(1),
    }
}
