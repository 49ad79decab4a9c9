//! Configuration management for sdsubmit.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::PathConvention;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "sdsubmit";

/// Default queue directory name.
const QUEUE_DIR_NAME: &str = "upload-queue";

/// Default lock file name.
const LOCK_FILE_NAME: &str = "upload-queue.lock";

/// Default catalog file name.
const CATALOG_FILE_NAME: &str = "catalog.toml";

/// Default flight journal file name.
const FLIGHT_LOG_FILE_NAME: &str = "flights.jsonl";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "SDSUBMIT_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SDSUBMIT_`, sections split by `__`)
/// 2. TOML config file at `~/.config/sdsubmit/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Queue configuration.
    pub queue: QueueConfig,
    /// Path rendering configuration.
    pub paths: PathsConfig,
    /// Lookup catalog configuration.
    pub catalog: CatalogConfig,
    /// Submission configuration.
    pub submission: SubmissionConfig,
}

/// Upload queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue storage directory.
    /// Defaults to `~/.local/share/sdsubmit/upload-queue`
    pub path: Option<PathBuf>,
    /// Lock file serializing queue writers.
    /// Defaults to `~/.local/share/sdsubmit/upload-queue.lock`
    pub lock_path: Option<PathBuf>,
    /// Longest wait for the lock, in seconds.
    pub lock_timeout_secs: u64,
}

/// Path rendering configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Separator convention of the machine consuming the queue.
    pub convention: PathConvention,
}

/// Lookup catalog configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog of clients, stands and filetypes.
    /// Defaults to `~/.config/sdsubmit/catalog.toml`
    pub path: Option<PathBuf>,
    /// Journal receiving flight metadata updates.
    /// Defaults to `~/.local/share/sdsubmit/flights.jsonl`
    pub flight_log_path: Option<PathBuf>,
}

/// Submission configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Pilots allowed to submit. Empty allows anyone.
    pub pilots: Vec<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: None,
            lock_path: None,
            lock_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    /// Get the default configuration directory.
    #[must_use]
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.queue.lock_timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "lock_timeout_secs must be greater than 0".to_string(),
            });
        }

        let queue_path = self.queue_path();
        if self.lock_path().starts_with(&queue_path) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "lock_path must not be inside the queue directory {}",
                    queue_path.display()
                ),
            });
        }

        let mut seen = HashSet::new();
        for pilot in &self.submission.pilots {
            if pilot.trim().is_empty() {
                return Err(Error::ConfigValidation {
                    message: "pilot names must not be empty".to_string(),
                });
            }
            if !seen.insert(pilot.as_str()) {
                return Err(Error::ConfigValidation {
                    message: format!("duplicate pilot: {pilot}"),
                });
            }
        }

        Ok(())
    }

    /// Check a pilot against the roster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPilot`] if a roster is configured and the pilot
    /// is not on it, or the name is blank.
    pub fn check_pilot(&self, pilot: &str) -> Result<()> {
        let known = self.submission.pilots.is_empty()
            || self.submission.pilots.iter().any(|p| p == pilot);
        if pilot.trim().is_empty() || !known {
            return Err(Error::UnknownPilot {
                name: pilot.to_string(),
            });
        }
        Ok(())
    }

    /// Get the queue directory, resolving defaults if not set.
    #[must_use]
    pub fn queue_path(&self) -> PathBuf {
        self.queue
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(QUEUE_DIR_NAME))
    }

    /// Get the lock file path, resolving defaults if not set.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.queue
            .lock_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(LOCK_FILE_NAME))
    }

    /// Get the catalog path, resolving defaults if not set.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.catalog
            .path
            .clone()
            .unwrap_or_else(|| Self::default_config_dir().join(CATALOG_FILE_NAME))
    }

    /// Get the flight journal path, resolving defaults if not set.
    #[must_use]
    pub fn flight_log_path(&self) -> PathBuf {
        self.catalog
            .flight_log_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(FLIGHT_LOG_FILE_NAME))
    }

    /// Get the lock timeout as a Duration.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.queue.lock_timeout_secs)
    }

    /// The configured path convention.
    #[must_use]
    pub fn path_convention(&self) -> PathConvention {
        self.paths.convention
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.queue.path.is_none());
        assert!(config.queue.lock_path.is_none());
        assert_eq!(config.queue.lock_timeout_secs, 30);
        assert_eq!(config.paths.convention, PathConvention::Native);
        assert!(config.submission.pilots.is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_lock_timeout() {
        let mut config = Config::default();
        config.queue.lock_timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("lock_timeout_secs"));
    }

    #[test]
    fn test_validate_lock_inside_queue() {
        let mut config = Config::default();
        config.queue.path = Some(PathBuf::from("/nas/queue"));
        config.queue.lock_path = Some(PathBuf::from("/nas/queue/queue.lock"));

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("lock_path"));
    }

    #[test]
    fn test_validate_duplicate_pilot() {
        let mut config = Config::default();
        config.submission.pilots = vec!["Jake".to_string(), "Jake".to_string()];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate pilot"));
    }

    #[test]
    fn test_check_pilot() {
        let mut config = Config::default();
        assert!(config.check_pilot("Anyone").is_ok());
        assert!(config.check_pilot("  ").is_err());

        config.submission.pilots = vec!["Matthew".to_string(), "Tristan".to_string()];
        assert!(config.check_pilot("Tristan").is_ok());
        assert!(matches!(
            config.check_pilot("select a pilot"),
            Err(Error::UnknownPilot { .. })
        ));
    }

    #[test]
    fn test_default_paths() {
        let config = Config::default();
        assert!(config.queue_path().ends_with("sdsubmit/upload-queue"));
        assert!(config.lock_path().ends_with("sdsubmit/upload-queue.lock"));
        assert!(config.catalog_path().ends_with("sdsubmit/catalog.toml"));
        assert!(config.flight_log_path().ends_with("sdsubmit/flights.jsonl"));
    }

    #[test]
    fn test_custom_paths() {
        let mut config = Config::default();
        config.queue.path = Some(PathBuf::from("/nas/queue"));
        config.queue.lock_path = Some(PathBuf::from("/nas/queue.lock"));

        assert_eq!(config.queue_path(), PathBuf::from("/nas/queue"));
        assert_eq!(config.lock_path(), PathBuf::from("/nas/queue.lock"));
    }

    #[test]
    fn test_lock_timeout() {
        let config = Config::default();
        assert_eq!(config.lock_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[queue]
path = "/nas/queue"
lock_path = "/nas/queue.lock"
lock_timeout_secs = 5

[paths]
convention = "windows"

[submission]
pilots = ["Matthew", "Tristan", "Jake", "James"]
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.queue_path(), PathBuf::from("/nas/queue"));
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.path_convention(), PathConvention::Windows);
        assert_eq!(config.submission.pilots.len(), 4);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[paths]\nconvention = \"amiga\"\n").unwrap();

        assert!(matches!(
            Config::load_from(Some(path)),
            Err(Error::ConfigLoad(_))
        ));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("lock_timeout_secs"));
        assert!(json.contains("\"native\""));
    }
}
