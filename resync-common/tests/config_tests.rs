//! Unit tests for configuration resolution and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate RESYNC_ROOT_FOLDER are marked with #[serial].

use resync_common::config::{
    load_or_default, load_toml_config, resolve_root_folder, write_toml_config, BootstrapConfig,
    CliOverrides, ConfigSource, SyncSettings, TomlConfig, DEFAULT_PORT, ROOT_FOLDER_ENV,
};
use resync_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_sync_settings_defaults() {
    let settings = SyncSettings::default();
    assert_eq!(settings.worker_count, 4);
    assert_eq!(settings.max_retries, 3);
    assert_eq!(settings.backoff_unit_ms, 1000);
    assert_eq!(settings.default_strategy, "last_write_wins");
    assert!(settings.strategies.iter().any(|s| s == "field_merge"));
    assert!(settings.validate().is_ok());
}

#[test]
fn test_zero_workers_rejected() {
    let settings = SyncSettings {
        worker_count: 0,
        ..SyncSettings::default()
    };
    assert!(matches!(settings.validate(), Err(Error::Config(_))));
}

#[test]
fn test_lease_must_outlast_lock_wait() {
    let settings = SyncSettings {
        max_lock_wait_ms: 5000,
        processing_lease_ms: 5000,
        ..SyncSettings::default()
    };
    assert!(matches!(settings.validate(), Err(Error::Config(_))));
    assert_eq!(SyncSettings::default().processing_lease_ms, 300_000);
}

#[test]
fn test_partial_toml_fills_defaults() {
    let config: TomlConfig = toml::from_str(
        r#"
        port = 6000

        [sync]
        max_retries = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.port, Some(6000));
    assert_eq!(config.sync.max_retries, 5);
    assert_eq!(config.sync.worker_count, 4);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_missing_toml_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("does-not-exist.toml");

    let (config, source) = load_or_default(Some(&missing)).unwrap();
    assert_eq!(source, ConfigSource::Missing(missing.clone()));
    assert!(config.port.is_none());
    assert_eq!(config.sync, SyncSettings::default());
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_write_then_load_toml() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/srv/resync"));
    config.sync.worker_count = 8;
    write_toml_config(&config, &path).unwrap();

    let (loaded, source) = load_or_default(Some(&path)).unwrap();
    assert_eq!(source, ConfigSource::File(path.clone()));
    assert_eq!(loaded.root_folder, Some(PathBuf::from("/srv/resync")));
    assert_eq!(loaded.sync.worker_count, 8);
}

#[test]
#[serial]
fn test_cli_root_folder_beats_env_and_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/from/toml"));

    let cli = PathBuf::from("/from/cli");
    let root = resolve_root_folder(Some(&cli), &config);
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(root, PathBuf::from("/from/cli"));
}

#[test]
#[serial]
fn test_env_root_folder_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/from/toml"));

    let root = resolve_root_folder(None, &config);
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(root, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_toml_root_folder_used_without_overrides() {
    env::remove_var(ROOT_FOLDER_ENV);
    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/from/toml"));

    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_bootstrap_resolves_database_under_root() {
    env::remove_var(ROOT_FOLDER_ENV);
    let cli = CliOverrides {
        root_folder: Some(PathBuf::from("/data")),
        ..CliOverrides::default()
    };

    let config = BootstrapConfig::resolve(cli, TomlConfig::default()).unwrap();
    assert_eq!(config.database_path, PathBuf::from("/data/resync.db"));
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.log_level, "info");
}

#[test]
#[serial]
fn test_bootstrap_relative_database_path_joins_root() {
    env::remove_var(ROOT_FOLDER_ENV);
    let mut toml_config = TomlConfig::default();
    toml_config.root_folder = Some(PathBuf::from("/data"));
    toml_config.database_path = Some(PathBuf::from("db/sync.db"));
    toml_config.port = Some(7000);

    let cli = CliOverrides {
        port: Some(7100),
        worker_count: Some(2),
        ..CliOverrides::default()
    };

    let config = BootstrapConfig::resolve(cli, toml_config).unwrap();
    assert_eq!(config.database_path, PathBuf::from("/data/db/sync.db"));
    assert_eq!(config.port, 7100);
    assert_eq!(config.sync.worker_count, 2);
}
