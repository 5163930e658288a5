//! Scoring engine backends
//!
//! The scoring function is opaque: it takes `(series name, average)` pairs
//! and returns one float. Which backend runs it is fixed when the engine is
//! built from configuration.

mod legacy_shell;
mod local;
mod remote;

pub use legacy_shell::LegacyShellEngine;
pub use local::LocalEngine;
pub use remote::RemoteEngine;

use crate::aggregator::SeriesAverage;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use trendscore_common::config::{EngineConfig, EngineKind};

/// Scoring failures; all of them abort the run
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scoring program '{program}' failed ({status}): {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Invalid scoring output: {0}")]
    InvalidOutput(String),

    #[error("Scoring service error: {0}")]
    Http(String),
}

/// Evaluates a named scoring function over one day's averages
#[async_trait]
pub trait ScoringEngine: Send + Sync {
    async fn calculate(&self, function: &str, averages: &[SeriesAverage]) -> Result<f64, ScoringError>;
}

/// Build the configured backend
pub fn build_engine(config: &EngineConfig) -> Result<Arc<dyn ScoringEngine>, ScoringError> {
    let engine: Arc<dyn ScoringEngine> = match config.kind {
        EngineKind::Local => Arc::new(LocalEngine::new(&config.local)),
        EngineKind::Remote => Arc::new(RemoteEngine::new(&config.remote)?),
        EngineKind::LegacyShell => Arc::new(LegacyShellEngine::new(&config.legacy_shell)),
    };
    tracing::info!(kind = ?config.kind, "Scoring engine ready");
    Ok(engine)
}

/// Engine input file: one `name,value` line per average, six decimals
pub fn format_input(averages: &[SeriesAverage]) -> String {
    averages
        .iter()
        .map(|a| format!("{},{:.6}\n", a.name, a.value))
        .collect()
}

/// Read the single float an engine writes as its result
pub fn parse_output(text: &str) -> Result<f64, ScoringError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ScoringError::InvalidOutput("empty output".to_string()));
    }
    trimmed
        .parse::<f64>()
        .map_err(|e| ScoringError::InvalidOutput(format!("'{}': {}", trimmed, e)))
}
