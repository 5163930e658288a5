//! Trailing moving averages over raw points
//!
//! The average of a series on day D over window W is the mean of its points
//! in `D - W + 1 ..= D`. With fewer than W points the average is undefined,
//! which is not the same as zero, and the series sits out that day.

use crate::store::ScoreStore;
use chrono::NaiveDate;
use trendscore_common::db::InputSeries;
use trendscore_common::time::shift_days;
use trendscore_common::Result;

/// A defined average for one series on one day
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesAverage {
    pub name: String,
    pub value: f64,
}

/// Mean of `values` when there is a full window of them
pub fn window_average(values: &[f64], window: u32) -> Option<f64> {
    if window == 0 || values.len() < window as usize {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(sum / values.len() as f64)
}

/// First day of the window ending on `day`
pub fn window_start(day: NaiveDate, window: u32) -> Result<NaiveDate> {
    shift_days(day, 1 - i64::from(window.max(1)))
}

/// Reads window points through the store and averages them
pub struct MovingAverageAggregator<'a> {
    store: &'a dyn ScoreStore,
}

impl<'a> MovingAverageAggregator<'a> {
    pub fn new(store: &'a dyn ScoreStore) -> Self {
        Self { store }
    }

    /// Average of `series` on `day`, or `None` when the window is incomplete
    pub async fn average(
        &self,
        series: &InputSeries,
        day: NaiveDate,
        window: u32,
    ) -> Result<Option<f64>> {
        let points = self
            .store
            .window_points(series, window_start(day, window)?, day)
            .await?;
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();

        let average = window_average(&values, window);
        if average.is_none() {
            tracing::warn!(
                series = %series.name,
                day = %day,
                window,
                points = values.len(),
                "Not enough data to average"
            );
        }
        Ok(average)
    }

    /// Defined averages of `series` on `day`, in series order
    pub async fn averages_for_day(
        &self,
        series: &[InputSeries],
        day: NaiveDate,
        window: u32,
    ) -> Result<Vec<SeriesAverage>> {
        let mut averages = Vec::with_capacity(series.len());
        for s in series {
            if let Some(value) = self.average(s, day, window).await? {
                averages.push(SeriesAverage {
                    name: s.name.clone(),
                    value,
                });
            }
        }
        Ok(averages)
    }
}
