//! Reconciliation engine
//!
//! Turns `(model, start, end)` into stored scores with the least fetch and
//! compute work:
//!
//! 1. Raw gaps over `start - window ..= end`
//! 2. Fetch the smallest range covering every raw gap, batch by batch,
//!    committing after each batch
//! 3. Score gaps over `start ..= end`, per region
//! 4. Score each gap day in ascending order, committing after each day
//! 5. Commit whatever is still staged
//! 6. Publish the latest computed score once, when notifications are enabled
//!
//! A second identical run finds no gaps and does no work. A failed fetch or
//! scoring call ends the run; everything committed before it stays.
//!
//! CSV models skip all of this: their scores are read from caller-supplied
//! CSV text and stored in one commit.

use crate::aggregator::MovingAverageAggregator;
use crate::batcher::{batches, BatchLimits};
use crate::error::{SyncError, SyncResult};
use crate::fetcher::RateLimitedFetcher;
use crate::gaps::GapDetector;
use crate::notifier::DownstreamNotifier;
use crate::scoring::ScoringEngine;
use crate::sources::{csv_import, FetchError};
use crate::store::ScoreStore;
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;
use trendscore_common::db::{ComputedScore, FetchLogEntry, Model};
use trendscore_common::time::{now, shift_days};
use uuid::Uuid;

/// Where a run is, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Starting,
    DetectingRawGaps,
    FetchingBatches,
    DetectingScoreGaps,
    Scoring,
    ImportingCsv,
    Committing,
    NotifyingDownstream,
    Done,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Starting => "starting",
            RunPhase::DetectingRawGaps => "detecting raw gaps",
            RunPhase::FetchingBatches => "fetching batches",
            RunPhase::DetectingScoreGaps => "detecting score gaps",
            RunPhase::Scoring => "scoring",
            RunPhase::ImportingCsv => "importing csv",
            RunPhase::Committing => "committing",
            RunPhase::NotifyingDownstream => "notifying downstream",
            RunPhase::Done => "done",
            RunPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What a run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub batches_fetched: usize,
    pub points_upserted: usize,
    pub fetch_log_entries: usize,
    pub scores_computed: usize,
    /// Score gap days with no defined average for any series
    pub days_skipped: usize,
    /// Most recent (day, value) computed by this run
    pub latest_score: Option<(NaiveDate, f64)>,
    pub notified: bool,
    pub phase: RunPhase,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            batches_fetched: 0,
            points_upserted: 0,
            fetch_log_entries: 0,
            scores_computed: 0,
            days_skipped: 0,
            latest_score: None,
            notified: false,
            phase: RunPhase::Starting,
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::debug!(run_id = %self.run_id, from = %self.phase, to = %phase, "Run phase");
        self.phase = phase;
    }

    fn record_score(&mut self, day: NaiveDate, value: f64) {
        self.scores_computed += 1;
        if self.latest_score.map_or(true, |(latest, _)| day >= latest) {
            self.latest_score = Some((day, value));
        }
    }
}

/// Map a model-level error to a configuration failure
fn config_error(err: trendscore_common::Error) -> SyncError {
    match err {
        trendscore_common::Error::Config(msg) | trendscore_common::Error::InvalidInput(msg) => {
            SyncError::Config(msg)
        }
        other => SyncError::Store(other),
    }
}

/// A source missing its settings is a configuration failure; every other
/// fetch error passes through unchanged
fn fetch_error(err: FetchError) -> SyncError {
    match err {
        FetchError::NotConfigured(msg) => SyncError::Config(msg),
        other => SyncError::Fetch(other),
    }
}

/// Orchestrates gap detection, fetching, aggregation, scoring and commit
/// for one model at a time
pub struct ReconciliationEngine {
    store: Arc<dyn ScoreStore>,
    fetcher: Option<RateLimitedFetcher>,
    scoring: Option<Arc<dyn ScoringEngine>>,
    notifier: Option<Arc<dyn DownstreamNotifier>>,
    limits: BatchLimits,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self {
            store,
            fetcher: None,
            scoring: None,
            notifier: None,
            limits: BatchLimits::default(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: RateLimitedFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_scoring(mut self, scoring: Arc<dyn ScoringEngine>) -> Self {
        self.scoring = Some(scoring);
        self
    }

    /// Notifications are sent only when a notifier is set
    pub fn with_notifier(mut self, notifier: Arc<dyn DownstreamNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Reconcile `model` over `start..=end`
    ///
    /// `raw_input` carries CSV text for CSV models and is ignored otherwise.
    pub async fn run(
        &self,
        model: &Model,
        start: NaiveDate,
        end: NaiveDate,
        raw_input: Option<&str>,
    ) -> SyncResult<RunReport> {
        if start > end {
            return Err(SyncError::Config(format!(
                "Start {} is after end {}",
                start, end
            )));
        }

        let mut report = RunReport::new(Uuid::new_v4());
        tracing::info!(
            run_id = %report.run_id,
            model = %model.name,
            kind = model.kind.as_str(),
            start = %start,
            end = %end,
            "Run model"
        );

        let result = if model.kind.is_fetched() {
            self.reconcile(model, start, end, &mut report).await
        } else {
            self.import_csv(model, start, end, raw_input, &mut report).await
        };

        match result {
            Ok(()) => {
                report.enter(RunPhase::Done);
                tracing::info!(
                    run_id = %report.run_id,
                    batches = report.batches_fetched,
                    points = report.points_upserted,
                    scores = report.scores_computed,
                    skipped = report.days_skipped,
                    notified = report.notified,
                    "Run complete"
                );
                Ok(report)
            }
            Err(err) => {
                let failed_in = report.phase;
                report.enter(RunPhase::Aborted);
                tracing::error!(
                    run_id = %report.run_id,
                    phase = %failed_in,
                    scores = report.scores_computed,
                    error = %err,
                    "Run aborted"
                );
                Err(err)
            }
        }
    }

    async fn reconcile(
        &self,
        model: &Model,
        start: NaiveDate,
        end: NaiveDate,
        report: &mut RunReport,
    ) -> SyncResult<()> {
        let settings = model.settings().map_err(config_error)?;
        let fetcher = self.fetcher.as_ref().ok_or_else(|| {
            SyncError::Config(format!("No data source configured for model '{}'", model.name))
        })?;
        let scoring = self.scoring.as_ref().ok_or_else(|| {
            SyncError::Config(format!("No scoring engine configured for model '{}'", model.name))
        })?;

        let store = self.store.as_ref();
        let detector = GapDetector::new(store);

        report.enter(RunPhase::DetectingRawGaps);
        let collect_from = shift_days(start, -settings.window_days()).map_err(config_error)?;
        let raw_gaps = detector.raw_gaps(&model.series, collect_from, end).await?;

        match (raw_gaps.first(), raw_gaps.last()) {
            (Some(&first), Some(&last)) => {
                report.enter(RunPhase::FetchingBatches);
                tracing::info!(
                    missing_days = raw_gaps.len(),
                    from = %first,
                    to = %last,
                    series = model.series.len(),
                    "Collecting raw points"
                );

                for batch in batches(&model.series, first, last, self.limits) {
                    let outcome = fetcher.fetch(&batch).await.map_err(fetch_error)?;

                    for point in &outcome.points {
                        store.upsert_raw_point(point).await?;
                    }
                    for day in &outcome.fetched_days {
                        store
                            .record_fetch(&FetchLogEntry {
                                source: fetcher.source_name().to_string(),
                                day: *day,
                                fetched_at: now(),
                                run_id: report.run_id,
                            })
                            .await?;
                    }
                    store.commit().await?;

                    report.batches_fetched += 1;
                    report.points_upserted += outcome.points.len();
                    report.fetch_log_entries += outcome.fetched_days.len();
                    tracing::debug!(
                        start = %batch.start,
                        end = %batch.end,
                        series = batch.series.len(),
                        points = outcome.points.len(),
                        "Batch committed"
                    );
                }
            }
            _ => tracing::info!("Raw points already collected"),
        }

        report.enter(RunPhase::DetectingScoreGaps);
        let aggregator = MovingAverageAggregator::new(store);

        for region in model.score_regions() {
            let score_gaps = detector.score_gaps(model, &region, start, end).await?;
            if score_gaps.is_empty() {
                tracing::info!(region = %region, "Scores already calculated");
                continue;
            }

            report.enter(RunPhase::Scoring);
            let series = model.series_for_region(&region);
            tracing::info!(region = %region, days = score_gaps.len(), "Calculating scores");

            for day in score_gaps {
                let averages = aggregator
                    .averages_for_day(&series, day, settings.window_size())
                    .await?;
                if averages.is_empty() {
                    report.days_skipped += 1;
                    tracing::debug!(region = %region, day = %day, "No averages, skipping day");
                    continue;
                }

                let value = scoring
                    .calculate(settings.scoring_function(), &averages)
                    .await?;

                store
                    .upsert_score(&ComputedScore {
                        model_id: model.id,
                        region: region.clone(),
                        day,
                        value,
                    })
                    .await?;
                store.commit().await?;
                report.record_score(day, value);
            }
        }

        report.enter(RunPhase::Committing);
        store.commit().await?;

        if let (Some((day, value)), Some(notifier)) = (report.latest_score, &self.notifier) {
            report.enter(RunPhase::NotifyingDownstream);
            match notifier.notify(day, value).await {
                Ok(()) => report.notified = true,
                Err(e) => tracing::warn!(day = %day, error = %e, "Failed to publish latest score"),
            }
        }

        Ok(())
    }

    async fn import_csv(
        &self,
        model: &Model,
        start: NaiveDate,
        end: NaiveDate,
        raw_input: Option<&str>,
        report: &mut RunReport,
    ) -> SyncResult<()> {
        let text = raw_input.ok_or_else(|| {
            SyncError::Config(format!("No CSV file provided for model '{}'", model.name))
        })?;

        report.enter(RunPhase::ImportingCsv);
        let scores = csv_import::parse_scores(text, start, end).map_err(config_error)?;

        let store = self.store.as_ref();
        for score in &scores {
            store
                .upsert_score(&ComputedScore {
                    model_id: model.id,
                    region: score.region.to_string(),
                    day: score.day,
                    value: score.value,
                })
                .await?;
        }

        report.enter(RunPhase::Committing);
        store.commit().await?;
        report.scores_computed = scores.len();
        tracing::info!(model = %model.name, scores = scores.len(), "CSV scores imported");
        Ok(())
    }
}
