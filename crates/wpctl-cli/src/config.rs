//! Configuration file management.
//!
//! The config lives at `<config dir>/wpctl/config.toml` unless `--config` or
//! `WPCTL_CONFIG` points elsewhere. A missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wpctl_core::{HistoryQuery, MIN_POLL_INTERVAL, SyncOptions};

/// Default controller address.
pub const DEFAULT_BASE_URL: &str = "http://raspberrypi.local:5000";

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Controller connection settings.
    pub api: ApiConfig,
    /// Polling settings used by `watch` and command reconciliation.
    pub polling: PollingConfig,
    /// Defaults for `history`.
    pub history: HistoryConfig,
    /// Disable colored output.
    pub no_color: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let url = self.base_url.trim();
        if url.is_empty() {
            errors.push(ValidationError::new("api.base_url", "base URL cannot be empty"));
        } else if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ValidationError::new(
                "api.base_url",
                format!("'{}' must start with http:// or https://", url),
            ));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            errors.push(ValidationError::new(
                "api.timeout_secs",
                format!("{} is out of range (1-300)", self.timeout_secs),
            ));
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between scheduled polls.
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    fn validate(&self) -> Vec<ValidationError> {
        if self.interval() < MIN_POLL_INTERVAL {
            vec![ValidationError::new(
                "polling.interval_secs",
                "interval must be at least 1 second",
            )]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub hours_back: u32,
    pub limit: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let query = HistoryQuery::default();
        Self {
            hours_back: query.hours_back,
            limit: query.limit,
        }
    }
}

impl HistoryConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.hours_back == 0 {
            errors.push(ValidationError::new("history.hours_back", "must be at least 1"));
        }
        if self.limit == 0 {
            errors.push(ValidationError::new("history.limit", "must be at least 1"));
        }
        errors
    }
}

impl Config {
    /// Load from `path`, or return defaults if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check every section and report all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = self.api.validate();
        errors.extend(self.polling.validate());
        errors.extend(self.history.validate());
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// History query from the config, with optional overrides.
    pub fn history_query(&self, hours: Option<u32>, limit: Option<u32>) -> HistoryQuery {
        HistoryQuery {
            hours_back: hours.unwrap_or(self.history.hours_back),
            limit: limit.unwrap_or(self.history.limit),
        }
    }

    /// Synchronization options, optionally with another poll interval.
    pub fn sync_options(&self, interval_secs: Option<u64>) -> SyncOptions {
        let interval = interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.polling.interval());
        SyncOptions::default()
            .poll_interval(interval)
            .history(self.history_query(None, None))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// One invalid field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted field path, e.g. `api.base_url`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default config file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wpctl")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.polling.interval(), Duration::from_secs(5));
        assert_eq!(config.history.hours_back, 6);
        assert_eq!(config.history.limit, 100);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.api.base_url = "http://192.168.1.40:5000".to_string();
        config.history.hours_back = 24;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[polling]\ninterval_secs = 30\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.polling.interval_secs, 30);
        assert_eq!(config.api, ApiConfig::default());
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api\nbase_url = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.api.base_url = "raspberrypi.local".to_string();
        config.api.timeout_secs = 0;
        config.polling.interval_secs = 0;
        config.history.limit = 0;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(
                    fields,
                    [
                        "api.base_url",
                        "api.timeout_secs",
                        "polling.interval_secs",
                        "history.limit"
                    ]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_overrides() {
        let config = Config::default();
        let query = config.history_query(Some(12), None);
        assert_eq!(query.hours_back, 12);
        assert_eq!(query.limit, 100);

        let options = config.sync_options(Some(60));
        assert_eq!(options.poll_interval, Duration::from_secs(60));
        assert!(options.validate().is_ok());
    }
}
