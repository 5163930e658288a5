//! Calendar-day utilities
//!
//! All series and scores are keyed by `NaiveDate`. Ranges in this crate are
//! inclusive on both ends unless stated otherwise.

use crate::{Error, Result};
use chrono::{DateTime, Days, Duration, NaiveDate, Utc};

/// Canonical day format used on the command line, in the database and in
/// downstream notifications
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Today's date in UTC
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse a `YYYY-MM-DD` day
pub fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DAY_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("Invalid day '{}' (expected YYYY-MM-DD): {}", s, e)))
}

/// Format a day as `YYYY-MM-DD`
pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Shift a day by a signed number of days
///
/// Fails with `Error::Config` when the result leaves chrono's calendar.
pub fn shift_days(day: NaiveDate, days: i64) -> Result<NaiveDate> {
    let offset = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        day.checked_add_days(offset)
    } else {
        day.checked_sub_days(offset)
    };
    shifted.ok_or_else(|| {
        Error::Config(format!("Shifting {} by {} days is out of range", day, days))
    })
}

/// Iterate every day in `start..=end`
///
/// Yields nothing when `start > end`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let count = if start > end { 0 } else { (end - start).num_days() + 1 };
    (0..count).map(move |offset| start + Duration::days(offset))
}

/// Number of days in `start..=end` (0 when `start > end`)
pub fn span_len(start: NaiveDate, end: NaiveDate) -> i64 {
    if start > end {
        0
    } else {
        (end - start).num_days() + 1
    }
}
