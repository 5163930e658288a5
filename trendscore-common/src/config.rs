//! Configuration loading and config-file resolution
//!
//! Configuration is a single TOML file. Every section and key is optional;
//! anything missing falls back to a compiled default so a fresh install runs
//! without any file at all.
//!
//! # Config File Resolution
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`TRENDSCORE_CONFIG`)
//! 3. Per-user default (`~/.config/trendscore/trendscore.toml`)
//! 4. Compiled defaults (no file)
//!
//! An explicitly named file that does not exist is an error. A missing
//! per-user default file is not.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "TRENDSCORE_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    pub database_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub google: GoogleConfig,
    pub ngram: NgramConfig,
    pub batching: BatchingConfig,
    pub retry: RetryConfig,
    pub engine: EngineConfig,
    pub notify: NotifyConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Google Trends for Health API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// API key (`TRENDSCORE_GOOGLE_API_KEY` takes priority)
    pub api_key: Option<String>,
    pub base_url: String,
    /// Geographic restriction applied to every query
    pub geo_region: String,
    pub timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://www.googleapis.com/trends/v1beta".to_string(),
            geo_region: "GB-ENG".to_string(),
            timeout_secs: 60,
        }
    }
}

/// N-gram count archive settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NgramConfig {
    /// Directory holding one `YYYYMMDD.tsv` count file per day
    pub archive_dir: Option<PathBuf>,
}

/// Server-side request size limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub max_series_per_batch: usize,
    /// Maximum series × days in one request
    pub max_points_per_batch: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_series_per_batch: 30,
            max_points_per_batch: 2000,
        }
    }
}

/// Fetch retry and pacing settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per batch, including the first
    pub max_attempts: u32,
    /// Delay after failed attempt `n` is `backoff_base^n` units
    pub backoff_base: u32,
    pub backoff_unit_ms: u64,
    /// Minimum spacing between requests to the source (0 disables pacing)
    pub min_request_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: 3,
            backoff_unit_ms: 1000,
            min_request_interval_ms: 0,
        }
    }
}

/// Which scoring engine backend to construct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    #[default]
    Local,
    Remote,
    LegacyShell,
}

impl std::str::FromStr for EngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(EngineKind::Local),
            "remote" => Ok(EngineKind::Remote),
            "legacy-shell" | "legacy_shell" | "legacy" => Ok(EngineKind::LegacyShell),
            other => Err(Error::Config(format!(
                "Unknown scoring engine '{}' (expected local, remote or legacy-shell)",
                other
            ))),
        }
    }
}

/// Scoring engine settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub local: LocalEngineConfig,
    pub remote: RemoteEngineConfig,
    pub legacy_shell: LegacyShellConfig,
}

/// Local process engine
///
/// `args` may contain `{function}`, `{input}` and `{output}` placeholders.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalEngineConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            program: "octave-cli".to_string(),
            args: vec![
                "--no-gui".to_string(),
                "--eval".to_string(),
                "run('gpml/startup.m'); {function}('{input}','{output}');".to_string(),
            ],
            working_dir: Some(PathBuf::from("octave")),
        }
    }
}

/// HTTP scoring service
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteEngineConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for RemoteEngineConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8090/calculate".to_string(),
            timeout_secs: 300,
        }
    }
}

/// scp/ssh driven MATLAB on a remote host
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LegacyShellConfig {
    pub host: String,
    /// Directory on the host the function runs from
    pub remote_workdir: String,
    pub startup_script: String,
    pub remote_input: String,
    pub remote_output: String,
    pub scp_program: String,
    pub ssh_program: String,
}

impl Default for LegacyShellConfig {
    fn default() -> Self {
        Self {
            host: "scoring-host".to_string(),
            remote_workdir: "scoring".to_string(),
            startup_script: "gpml/startup.m".to_string(),
            remote_input: "/tmp/trendscore_matlab_input".to_string(),
            remote_output: "/tmp/trendscore_matlab_output".to_string(),
            scp_program: "scp".to_string(),
            ssh_program: "ssh".to_string(),
        }
    }
}

/// Downstream score notification settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Feature flag; nothing is sent unless set
    pub enabled: bool,
    /// STOMP broker address (`host:port`, optional `tcp://` prefix)
    pub broker: String,
    pub destination: String,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "127.0.0.1:61613".to_string(),
            destination: "/queue/PubModelScore.Q".to_string(),
            login: None,
            passcode: None,
            timeout_secs: 10,
        }
    }
}

impl TomlConfig {
    /// Database path from config, or the platform default
    pub fn database_path_or_default(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(default_database_path)
    }
}

/// OS-dependent default database location
///
/// `~/.local/share/trendscore/trendscore.db` on Linux, the platform data
/// directory elsewhere, `./trendscore.db` when none can be determined.
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("trendscore").join("trendscore.db"))
        .unwrap_or_else(|| PathBuf::from("trendscore.db"))
}

/// Per-user default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trendscore").join("trendscore.toml"))
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Resolve and load configuration
///
/// See the module docs for the resolution order.
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    let explicit = cli_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        info!("Loading configuration from {}", path.display());
        return load_toml_config(&path);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        _ => {
            warn!("No config file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}
