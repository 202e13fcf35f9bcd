//! Harness configuration.
//!
//! Reads an optional `webext-rig.toml` from the host runner's project
//! directory. Every field has a default, so the file is only needed to
//! override behavior.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::logging::{DEFAULT_LOG_LEVEL, DEFAULT_LOG_RETENTION_HOURS, LogConfig};

/// Config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "webext-rig.toml";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "WEBEXT_RIG_CONFIG";

/// Default alias given to a definition that does not name one.
pub const DEFAULT_ALIAS: &str = "extension";

/// Default command timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Harness configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Alias used when a definition does not specify one.
    pub default_alias: String,
    /// Command timeout in milliseconds when neither the call nor the client
    /// context sets one.
    pub default_timeout_ms: u64,
    /// Base directory for per-alias working directories. Defaults to
    /// `<system tmp>/webext-rig`.
    pub work_dir: Option<PathBuf>,
    /// Logging settings.
    pub log: LogSection,
}

/// `[log]` section of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
    pub retention_hours: u32,
    pub enabled: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            retention_hours: DEFAULT_LOG_RETENTION_HOURS,
            enabled: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_alias: DEFAULT_ALIAS.to_string(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            work_dir: None,
            log: LogSection::default(),
        }
    }
}

impl Config {
    /// Loads configuration, falling back to defaults when no file exists.
    ///
    /// Lookup order: `$WEBEXT_RIG_CONFIG`, then `webext-rig.toml` in the
    /// working directory.
    #[must_use]
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    tracing::warn!("Failed to read {}: {}, using defaults", path.display(), e);
                }
                Self::default()
            }
        }
    }

    /// Loads configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Returns the base directory for per-alias working directories.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("webext-rig"))
    }

    /// Returns the logging configuration.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            retention_hours: self.log.retention_hours,
            level: LogConfig::parse_level(&self.log.level),
            enabled: self.log.enabled,
        }
    }
}

/// Config loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
