//! In-process stand-ins for the source, scoring engine and notifier

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use trendscore_common::time::days_inclusive;
use trendscore_sync::aggregator::SeriesAverage;
use trendscore_sync::notifier::{DownstreamNotifier, NotifyError};
use trendscore_sync::scoring::{ScoringEngine, ScoringError};
use trendscore_sync::sources::{FetchError, FetchRequest, SignalSource, SourcePoint};

/// One request seen by `FakeSource`
#[derive(Debug, Clone, PartialEq)]
pub struct SeenRequest {
    pub series: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Answers every request with `value` for each (series, day), except on
/// `omitted` days; scripted failures are returned first
pub struct FakeSource {
    value: f64,
    omitted: BTreeSet<NaiveDate>,
    failures: Mutex<VecDeque<FetchError>>,
    fail_on_call: Option<usize>,
    requests: Mutex<Vec<SeenRequest>>,
}

impl FakeSource {
    pub fn new(value: f64) -> Arc<Self> {
        Self::build(value, BTreeSet::new(), Vec::new(), None)
    }

    /// Source with no data for `omitted`
    pub fn omitting(value: f64, omitted: &[NaiveDate]) -> Arc<Self> {
        Self::build(value, omitted.iter().copied().collect(), Vec::new(), None)
    }

    /// Source that fails its first calls with `failures`
    pub fn failing_first(value: f64, failures: Vec<FetchError>) -> Arc<Self> {
        Self::build(value, BTreeSet::new(), failures, None)
    }

    /// Source whose `call`-th request (1-based) fails terminally
    pub fn failing_on_call(value: f64, call: usize) -> Arc<Self> {
        Self::build(value, BTreeSet::new(), Vec::new(), Some(call))
    }

    fn build(
        value: f64,
        omitted: BTreeSet<NaiveDate>,
        failures: Vec<FetchError>,
        fail_on_call: Option<usize>,
    ) -> Arc<Self> {
        Arc::new(Self {
            value,
            omitted,
            failures: Mutex::new(failures.into()),
            fail_on_call,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<SourcePoint>, FetchError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(SeenRequest {
                series: request.series.iter().map(|s| s.name.clone()).collect(),
                start: request.start,
                end: request.end,
            });
            requests.len()
        };

        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if self.fail_on_call == Some(call) {
            return Err(FetchError::BadRequest(format!("scripted failure on call {}", call)));
        }

        let mut points = Vec::new();
        for series in request.series {
            for day in days_inclusive(request.start, request.end) {
                if self.omitted.contains(&day) {
                    continue;
                }
                points.push(SourcePoint {
                    series_name: series.name.clone(),
                    region: series.region.clone(),
                    day,
                    value: self.value,
                });
            }
        }
        Ok(points)
    }
}

/// Scores a day as the sum of its averages
pub struct FakeEngine {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    functions: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on_call: None,
            functions: Mutex::new(Vec::new()),
        })
    }

    /// Engine whose `call`-th calculation (1-based) fails
    pub fn failing_on_call(call: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on_call: Some(call),
            functions: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn functions(&self) -> Vec<String> {
        self.functions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScoringEngine for FakeEngine {
    async fn calculate(&self, function: &str, averages: &[SeriesAverage]) -> Result<f64, ScoringError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.functions.lock().unwrap().push(function.to_string());

        if self.fail_on_call == Some(call) {
            return Err(ScoringError::ProcessFailed {
                program: "fake".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("scripted failure on call {}", call),
            });
        }
        Ok(averages.iter().map(|a| a.value).sum())
    }
}

/// Records notifications instead of sending them
pub struct RecordingNotifier {
    sent: Mutex<Vec<(NaiveDate, f64)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    /// Notifier whose broker is unreachable
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn sent(&self) -> Vec<(NaiveDate, f64)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownstreamNotifier for RecordingNotifier {
    async fn notify(&self, day: NaiveDate, value: f64) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((day, value));
        if self.fail {
            return Err(NotifyError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "broker down",
            )));
        }
        Ok(())
    }
}
