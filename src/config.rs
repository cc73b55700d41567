//! Extractor configuration. Window bounds are passed explicitly into
//! [`WindowPolicy`](crate::features::WindowPolicy), never read from globals.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "DUMP_FEATURES_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database holding dump history and feature rows
    pub database_path: PathBuf,
    /// Bounds of the history slice used for aggregation
    pub window: WindowConfig,
    /// Scope-specific knobs
    pub features: FeaturesConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Only dumps with `dump_id > target - max_past_dumps` are eligible
    pub max_past_dumps: i64,
    /// Only dumps newer than `target_date - max_past_days` are eligible
    pub max_past_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Shapes shorter than this are too generic to group URLs by
    pub min_shape_len: usize,
    /// Host scope divides suspicious downloads by distinct hashes instead of
    /// downloads. Set to false to use the download count like every other scope.
    pub host_suspicious_over_hashes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("history.db"),
            window: WindowConfig::default(),
            features: FeaturesConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_past_dumps: 500,
            max_past_days: 60,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            min_shape_len: 10,
            host_suspicious_over_hashes: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Read from a JSON file. A missing file yields the defaults; an
    /// unreadable or malformed one is an error.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &Path) -> Self {
        match Self::read(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring config file, using defaults");
                Self::default()
            }
        }
    }

    /// Config file named by [`CONFIG_PATH_ENV`], falling back to `config.json`.
    pub fn path_from_env() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"))
    }
}
