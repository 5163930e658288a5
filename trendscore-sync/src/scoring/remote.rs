//! HTTP scoring service client

use super::{ScoringEngine, ScoringError};
use crate::aggregator::SeriesAverage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trendscore_common::config::RemoteEngineConfig;

#[derive(Debug, Serialize)]
struct CalculateRequest<'a> {
    function: &'a str,
    averages: Vec<AverageEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct AverageEntry<'a> {
    name: &'a str,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct CalculateResponse {
    value: f64,
}

/// Posts averages to a scoring service and reads back `{"value": ..}`
pub struct RemoteEngine {
    client: Client,
    url: String,
}

impl RemoteEngine {
    pub fn new(config: &RemoteEngineConfig) -> Result<Self, ScoringError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScoringError::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl ScoringEngine for RemoteEngine {
    async fn calculate(&self, function: &str, averages: &[SeriesAverage]) -> Result<f64, ScoringError> {
        let body = CalculateRequest {
            function,
            averages: averages
                .iter()
                .map(|a| AverageEntry {
                    name: &a.name,
                    value: a.value,
                })
                .collect(),
        };

        tracing::debug!(url = %self.url, function, inputs = averages.len(), "Requesting remote score");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScoringError::Http(format!("Request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ScoringError::Http(format!("HTTP {}: {}", status, text.trim())));
        }

        let parsed: CalculateResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::InvalidOutput(format!("Unreadable scoring response: {}", e)))?;
        Ok(parsed.value)
    }
}
