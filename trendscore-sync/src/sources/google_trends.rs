//! Google Trends for Health client
//!
//! One `timelinesForHealth` request per batch. The server caps a request at
//! 30 terms and 2000 term-days; batching keeps requests inside those limits.

use super::{FetchError, FetchRequest, SignalSource, SourcePoint};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use trendscore_common::config::GoogleConfig;
use trendscore_common::time::format_day;
use trendscore_common::{Error, Result};

/// Environment variable holding the API key
pub const GOOGLE_API_KEY_ENV: &str = "TRENDSCORE_GOOGLE_API_KEY";

/// Date format of response points (`Jan 05 2017`)
const POINT_DATE_FORMAT: &str = "%b %d %Y";

#[derive(Debug, Deserialize)]
struct TimelinesResponse {
    #[serde(default)]
    lines: Vec<TimelineLine>,
}

#[derive(Debug, Deserialize)]
struct TimelineLine {
    term: String,
    #[serde(default)]
    points: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    date: String,
    value: f64,
}

/// Search-term volumes from the Trends for Health API
pub struct GoogleTrendsSource {
    client: Client,
    base_url: String,
    geo_region: String,
    api_key: Option<String>,
}

impl GoogleTrendsSource {
    /// Build a client
    ///
    /// A missing `api_key` only fails once a request has to be sent.
    pub fn new(config: &GoogleConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            geo_region: config.geo_region.clone(),
            api_key,
        })
    }

    fn query_params(&self, request: &FetchRequest<'_>, api_key: &str) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = request
            .series
            .iter()
            .map(|s| ("terms", s.name.clone()))
            .collect();
        params.push(("geoRestriction.region", self.geo_region.clone()));
        params.push(("time.startDate", format_day(request.start)));
        params.push(("time.endDate", format_day(request.end)));
        params.push(("timelineResolution", "day".to_string()));
        params.push(("key", api_key.to_string()));
        params
    }
}

/// Map a non-success status to a fetch error
fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let detail = format!("HTTP {}: {}", status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
        FetchError::RateLimited(detail)
    } else if status.is_server_error() {
        FetchError::Transient(detail)
    } else {
        FetchError::BadRequest(detail)
    }
}

/// Parse a response body into source points
fn parse_timelines(body: &str) -> std::result::Result<Vec<SourcePoint>, FetchError> {
    let response: TimelinesResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("Invalid timelines JSON: {}", e)))?;

    let mut points = Vec::new();
    for line in response.lines {
        for point in line.points {
            let day = NaiveDate::parse_from_str(&point.date, POINT_DATE_FORMAT).map_err(|e| {
                FetchError::Malformed(format!("Invalid point date '{}': {}", point.date, e))
            })?;
            points.push(SourcePoint {
                series_name: line.term.clone(),
                region: None,
                day,
                value: point.value,
            });
        }
    }
    Ok(points)
}

#[async_trait]
impl SignalSource for GoogleTrendsSource {
    fn name(&self) -> &str {
        "google"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> std::result::Result<Vec<SourcePoint>, FetchError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(FetchError::NotConfigured(format!(
                "Google API key not configured. Set {} or add api_key to the [google] section",
                GOOGLE_API_KEY_ENV
            )));
        };
        let url = format!("{}/timelinesForHealth", self.base_url);

        tracing::info!(
            terms = request.series.len(),
            start = %request.start,
            end = %request.end,
            "Querying Google Trends"
        );

        let response = self
            .client
            .get(&url)
            .query(&self.query_params(request, api_key))
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("Google Trends request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("Failed to read Google Trends response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let points = parse_timelines(&body)?;
        tracing::debug!(points = points.len(), "Google Trends response parsed");
        Ok(points)
    }
}
