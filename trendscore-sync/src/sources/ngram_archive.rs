//! Daily n-gram count archive
//!
//! Counts are produced upstream, one file per day:
//! `<archive_dir>/<YYYYMMDD>.tsv` with lines `region<TAB>ngram<TAB>value`.

use super::{FetchError, FetchRequest, SignalSource, SourcePoint};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use trendscore_common::time::days_inclusive;

/// Reads region-scoped n-gram counts from the archive directory
pub struct NgramArchiveSource {
    archive_dir: PathBuf,
}

impl NgramArchiveSource {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    /// Count file for `day`
    pub fn day_file(&self, day: NaiveDate) -> PathBuf {
        self.archive_dir.join(format!("{}.tsv", day.format("%Y%m%d")))
    }
}

/// Parse one archive line into (region, ngram, value)
fn parse_line(line: &str) -> Option<(&str, &str, f64)> {
    let mut fields = line.split('\t');
    let region = fields.next()?.trim();
    let ngram = fields.next()?.trim();
    let value = fields.next()?.trim().parse::<f64>().ok()?;
    if fields.next().is_some() || region.is_empty() || ngram.is_empty() {
        return None;
    }
    Some((region, ngram, value))
}

#[async_trait]
impl SignalSource for NgramArchiveSource {
    fn name(&self) -> &str {
        "ngram"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<SourcePoint>, FetchError> {
        let wanted: HashSet<(&str, &str)> = request
            .series
            .iter()
            .filter_map(|s| s.region.as_deref().map(|r| (r, s.name.as_str())))
            .collect();

        let mut points = Vec::new();

        for day in days_inclusive(request.start, request.end) {
            let path = self.day_file(day);
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::warn!(day = %day, path = %path.display(), "No n-gram counts for day");
                    continue;
                }
                Err(e) => {
                    return Err(FetchError::Transient(format!(
                        "Failed to read {}: {}",
                        path.display(),
                        e
                    )))
                }
            };

            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let Some((region, ngram, value)) = parse_line(line) else {
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        "Skipping malformed n-gram count line"
                    );
                    continue;
                };
                if wanted.contains(&(region, ngram)) {
                    points.push(SourcePoint {
                        series_name: ngram.to_string(),
                        region: Some(region.to_string()),
                        day,
                        value,
                    });
                }
            }
        }

        Ok(points)
    }
}
