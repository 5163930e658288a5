//! Gap detection
//!
//! A gap is a requested day missing from the store. Raw gaps are days where
//! at least one series lacks a point; score gaps are days a model has no
//! score for in a region. Detection never writes.

use crate::store::ScoreStore;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use trendscore_common::db::{InputSeries, Model};
use trendscore_common::time::days_inclusive;
use trendscore_common::Result;

/// Days of the requested range absent from `known`
pub fn missing_days(
    start: NaiveDate,
    end: NaiveDate,
    known: &BTreeSet<NaiveDate>,
) -> BTreeSet<NaiveDate> {
    days_inclusive(start, end)
        .filter(|day| !known.contains(day))
        .collect()
}

/// Finds missing raw points and missing scores through a `ScoreStore`
pub struct GapDetector<'a> {
    store: &'a dyn ScoreStore,
}

impl<'a> GapDetector<'a> {
    pub fn new(store: &'a dyn ScoreStore) -> Self {
        Self { store }
    }

    /// Union over `series` of the requested days each one lacks
    pub async fn raw_gaps(
        &self,
        series: &[InputSeries],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>> {
        let mut gaps = BTreeSet::new();
        if start > end {
            return Ok(gaps);
        }

        for s in series {
            let known = self.store.known_days(s).await?;
            let missing = missing_days(start, end, &known);
            if !missing.is_empty() {
                tracing::debug!(
                    series = %s.name,
                    region = s.region.as_deref().unwrap_or("-"),
                    missing = missing.len(),
                    "Series has raw gaps"
                );
            }
            gaps.extend(missing);
        }

        Ok(gaps)
    }

    /// Requested days without a score for `model` in `region`
    pub async fn score_gaps(
        &self,
        model: &Model,
        region: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>> {
        if start > end {
            return Ok(BTreeSet::new());
        }
        let known = self.store.known_score_days(model, region).await?;
        Ok(missing_days(start, end, &known))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendscore_common::time::parse_day;

    fn d(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    #[test]
    fn test_missing_days_skips_known() {
        let known: BTreeSet<_> = [d("2020-01-01"), d("2020-01-03")].into_iter().collect();
        let gaps = missing_days(d("2020-01-01"), d("2020-01-04"), &known);
        assert_eq!(gaps.into_iter().collect::<Vec<_>>(), vec![d("2020-01-02"), d("2020-01-04")]);
    }

    #[test]
    fn test_empty_range_has_no_gaps() {
        let gaps = missing_days(d("2020-01-05"), d("2020-01-04"), &BTreeSet::new());
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_nothing_known_means_every_day_is_a_gap() {
        let gaps = missing_days(d("2020-01-01"), d("2020-01-10"), &BTreeSet::new());
        assert_eq!(gaps.len(), 10);
    }
}
