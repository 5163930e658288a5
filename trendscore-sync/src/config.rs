//! Configuration resolution for trendscore-sync
//!
//! Layers environment overrides on top of the TOML config and wires a
//! `ReconciliationEngine` for a model from the result.
//!
//! **Priority:** ENV → TOML → compiled default

use crate::batcher::BatchLimits;
use crate::engine::ReconciliationEngine;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{RateLimitedFetcher, RetryPolicy};
use crate::notifier::StompNotifier;
use crate::scoring::build_engine;
use crate::sources::{GoogleTrendsSource, NgramArchiveSource, SignalSource};

pub use crate::sources::google_trends::GOOGLE_API_KEY_ENV;
use crate::store::ScoreStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use trendscore_common::config::{EngineKind, TomlConfig};
use trendscore_common::db::{Model, ModelKind};

/// Scoring engine kind (`local`, `remote`, `legacy-shell`)
pub const ENGINE_ENV: &str = "TRENDSCORE_ENGINE";
/// Downstream notification flag
pub const NOTIFY_ENABLED_ENV: &str = "TRENDSCORE_NOTIFY_ENABLED";

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the Google API key
///
/// **Priority:** ENV → TOML
///
/// `None` is not an error here: runs that find no raw gaps never need it.
pub fn resolve_google_api_key(config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(GOOGLE_API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = config.google.api_key.clone().filter(|k| is_valid_key(k));

    match (env_key, toml_key) {
        (Some(key), toml_key) => {
            if toml_key.is_some() {
                warn!("Google API key found in environment and TOML config. Using environment.");
            }
            info!("Google API key loaded from environment variable");
            Some(key)
        }
        (None, Some(key)) => {
            info!("Google API key loaded from TOML config");
            Some(key)
        }
        (None, None) => {
            warn!("Google API key not configured; fetching will fail if raw data is missing");
            None
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `TRENDSCORE_ENGINE` and `TRENDSCORE_NOTIFY_ENABLED`
pub fn apply_env_overrides(config: &mut TomlConfig) -> SyncResult<()> {
    if let Ok(value) = std::env::var(ENGINE_ENV) {
        let kind: EngineKind = value
            .parse()
            .map_err(|e: trendscore_common::Error| SyncError::Config(e.to_string()))?;
        info!(kind = ?kind, "Scoring engine selected by {}", ENGINE_ENV);
        config.engine.kind = kind;
    }

    if let Ok(value) = std::env::var(NOTIFY_ENABLED_ENV) {
        config.notify.enabled = parse_flag(&value).ok_or_else(|| {
            SyncError::Config(format!("{} must be true or false, got '{}'", NOTIFY_ENABLED_ENV, value))
        })?;
    }

    Ok(())
}

/// Source a fetched model reads from
fn source_for(model: &Model, config: &TomlConfig) -> SyncResult<Arc<dyn SignalSource>> {
    match model.kind {
        ModelKind::Search => {
            let key = resolve_google_api_key(config);
            Ok(Arc::new(GoogleTrendsSource::new(&config.google, key)?))
        }
        ModelKind::Ngram => {
            let dir = config.ngram.archive_dir.clone().ok_or_else(|| {
                SyncError::Config("No n-gram archive_dir configured in the [ngram] section".to_string())
            })?;
            Ok(Arc::new(NgramArchiveSource::new(dir)))
        }
        ModelKind::Csv => Err(SyncError::Config(format!(
            "Model '{}' imports CSV and has no fetch source",
            model.name
        ))),
    }
}

/// Wire an engine able to run `model`
///
/// CSV models get a bare engine; fetched models get their source, scoring
/// backend and, when enabled, the downstream notifier.
pub fn assemble_engine(
    model: &Model,
    config: &TomlConfig,
    store: Arc<dyn ScoreStore>,
) -> SyncResult<ReconciliationEngine> {
    let mut engine =
        ReconciliationEngine::new(store).with_limits(BatchLimits::from(&config.batching));

    if !model.kind.is_fetched() {
        return Ok(engine);
    }

    let fetcher = RateLimitedFetcher::new(source_for(model, config)?, RetryPolicy::from(&config.retry))
        .with_min_interval(Duration::from_millis(config.retry.min_request_interval_ms));
    engine = engine
        .with_fetcher(fetcher)
        .with_scoring(build_engine(&config.engine)?);

    if config.notify.enabled {
        info!(broker = %config.notify.broker, "Downstream notifications enabled");
        engine = engine.with_notifier(Arc::new(StompNotifier::new(&config.notify)));
    }

    Ok(engine)
}
