//! Configuration loading and graceful degradation
//!
//! Tests touching TRENDSCORE_CONFIG are #[serial] so they never race on the
//! process environment.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use trendscore_common::config::{load_config, load_toml_config, EngineKind, TomlConfig, CONFIG_ENV_VAR};
use trendscore_common::Error;

#[test]
fn test_defaults_match_source_limits() {
    let config = TomlConfig::default();

    assert_eq!(config.batching.max_series_per_batch, 30);
    assert_eq!(config.batching.max_points_per_batch, 2000);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.backoff_base, 3);
    assert_eq!(config.retry.backoff_unit_ms, 1000);
    assert_eq!(config.google.geo_region, "GB-ENG");
    assert_eq!(config.engine.kind, EngineKind::Local);
    assert!(!config.notify.enabled);
    assert_eq!(config.notify.destination, "/queue/PubModelScore.Q");
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_partial_file_keeps_defaults_for_missing_keys() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trendscore.toml");
    std::fs::write(
        &path,
        r#"
database_path = "/var/lib/trendscore/scores.db"

[batching]
max_series_per_batch = 10

[engine]
kind = "legacy-shell"

[engine.legacy_shell]
host = "matlab-box"

[notify]
enabled = true
broker = "tcp://mq.example.org:7672"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.database_path, Some(PathBuf::from("/var/lib/trendscore/scores.db")));
    assert_eq!(config.batching.max_series_per_batch, 10);
    assert_eq!(config.batching.max_points_per_batch, 2000);
    assert_eq!(config.engine.kind, EngineKind::LegacyShell);
    assert_eq!(config.engine.legacy_shell.host, "matlab-box");
    assert_eq!(config.engine.legacy_shell.scp_program, "scp");
    assert!(config.notify.enabled);
    assert_eq!(config.notify.broker, "tcp://mq.example.org:7672");
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(&path, "[batching\nmax_series_per_batch = ").unwrap();

    let result = load_toml_config(&path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_engine_kind_from_str() {
    assert_eq!("remote".parse::<EngineKind>().unwrap(), EngineKind::Remote);
    assert_eq!("Legacy".parse::<EngineKind>().unwrap(), EngineKind::LegacyShell);
    assert!("matlab-cloud".parse::<EngineKind>().is_err());
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let result = load_config(Some(&missing));
    assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("not found")));
}

#[test]
#[serial]
fn test_env_var_names_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("env.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let config = load_config(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    let temp_dir = TempDir::new().unwrap();
    let env_path = temp_dir.path().join("env.toml");
    let cli_path = temp_dir.path().join("cli.toml");
    std::fs::write(&env_path, "[logging]\nlevel = \"debug\"\n").unwrap();
    std::fs::write(&cli_path, "[logging]\nlevel = \"warn\"\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &env_path);
    let config = load_config(Some(&cli_path)).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.logging.level, "warn");
}
