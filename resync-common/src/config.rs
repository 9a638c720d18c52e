//! Bootstrap configuration loading and root folder resolution
//!
//! Priority order for every bootstrap setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: compiled defaults are used and the
//! caller logs a warning. A TOML file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "RESYNC_ROOT_FOLDER";

/// Default HTTP port for resync-engine
pub const DEFAULT_PORT: u16 = 5740;

/// Database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "resync.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and runtime files
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path (relative paths are resolved against the root folder)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sync engine tuning
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Sync engine settings (`[sync]` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Number of parallel queue workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Failed attempts before an operation is marked failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// One backoff time unit; retry N waits 2^N units
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// Idle worker poll interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum time a handler transaction is re-run on SQLite lock contention
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,

    /// How long a claimed operation may stay `processing` before another
    /// worker may reclaim it
    #[serde(default = "default_processing_lease_ms")]
    pub processing_lease_ms: u64,

    /// Conflict strategy used when the caller supplies none
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    /// Conflict strategies callers may request by name
    #[serde(default = "default_strategies")]
    pub strategies: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
            processing_lease_ms: default_processing_lease_ms(),
            default_strategy: default_strategy(),
            strategies: default_strategies(),
        }
    }
}

impl SyncSettings {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config("sync.worker_count must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("sync.max_retries must be at least 1".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("sync.poll_interval_ms must be at least 1".to_string()));
        }
        if self.processing_lease_ms <= self.max_lock_wait_ms {
            return Err(Error::Config(
                "sync.processing_lease_ms must exceed sync.max_lock_wait_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_processing_lease_ms() -> u64 {
    300_000
}

fn default_strategy() -> String {
    "last_write_wins".to_string()
}

fn default_strategies() -> Vec<String> {
    ["last_write_wins", "prefer_local", "prefer_remote", "field_merge"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Default TOML location: `<config_dir>/resync/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("resync").join("config.toml"))
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Where the bootstrap TOML config came from
///
/// Config is loaded before the tracing subscriber exists, so the outcome is
/// returned and logged with [`ConfigSource::log`] once tracing is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at the path; compiled defaults used
    Missing(PathBuf),
    /// No config directory on this platform; compiled defaults used
    NoConfigDir,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::Missing(path) => warn!(
                "Config file not found at {}, using compiled defaults",
                path.display()
            ),
            ConfigSource::NoConfigDir => {
                warn!("Could not determine config directory, using compiled defaults")
            }
        }
    }
}

/// Load the TOML config, falling back to defaults when the file is absent
pub fn load_or_default(explicit_path: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    let path = match explicit_path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path(),
    };

    match path {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            Ok((config, ConfigSource::File(path)))
        }
        Some(path) => Ok((TomlConfig::default(), ConfigSource::Missing(path))),
        None => Ok((TomlConfig::default(), ConfigSource::NoConfigDir)),
    }
}

/// Write a TOML config file (used by tooling and tests)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Root folder resolution (CLI → ENV → TOML → OS default)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("resync"))
        .unwrap_or_else(|| PathBuf::from("./resync_data"))
}

/// Command-line overrides handed in by the binary
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub worker_count: Option<usize>,
}

/// Fully resolved bootstrap configuration
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub port: u16,
    pub log_level: String,
    pub sync: SyncSettings,
}

impl BootstrapConfig {
    /// Merge CLI overrides, environment and TOML into the final configuration
    pub fn resolve(cli: CliOverrides, toml_config: TomlConfig) -> Result<Self> {
        let root_folder = resolve_root_folder(cli.root_folder.as_deref(), &toml_config);

        let database_path = cli
            .database_path
            .or_else(|| toml_config.database_path.clone())
            .map(|p| if p.is_relative() { root_folder.join(p) } else { p })
            .unwrap_or_else(|| root_folder.join(DEFAULT_DATABASE_FILE));

        let mut sync = toml_config.sync;
        if let Some(workers) = cli.worker_count {
            sync.worker_count = workers;
        }
        sync.validate()?;

        Ok(Self {
            root_folder,
            database_path,
            port: cli.port.or(toml_config.port).unwrap_or(DEFAULT_PORT),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            sync,
        })
    }
}
