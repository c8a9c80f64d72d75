//! Configuration file
//!
//! A single JSON object. Every field is optional:
//!
//! ```json
//! {
//!   "data_dir": "./data",
//!   "preview_row_limit": 100,
//!   "max_upload_bytes": 104857600,
//!   "busy_timeout_ms": 5000,
//!   "log_level": "info",
//!   "http": { "host": "0.0.0.0", "port": 8000, "cors_origins": ["http://localhost:5173"] }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::dataset::DatasetConfig;
use crate::http_server::HttpServerConfig;
use crate::observability::Severity;

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage and ingestion settings, at the top level of the file
    #[serde(flatten)]
    pub dataset: DatasetConfig,

    /// Minimum log severity (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// HTTP server settings
    #[serde(default)]
    pub http: HttpServerConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            log_level: default_log_level(),
            http: HttpServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        Self::from_json(&content)
    }

    /// Load `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> CliResult<()> {
        self.dataset.validate().map_err(CliError::config_error)?;
        self.severity()?;

        if self.http.host.trim().is_empty() {
            return Err(CliError::config_error("http.host must not be empty"));
        }

        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> CliResult<Severity> {
        self.log_level.parse().map_err(CliError::config_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.dataset, DatasetConfig::default());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.http.port, 8000);
    }

    #[test]
    fn test_flattened_dataset_fields() {
        let config = Config::from_json(
            r#"{"data_dir": "/srv/ditto", "preview_row_limit": 10, "http": {"port": 9000}}"#,
        )
        .unwrap();

        assert_eq!(config.dataset.data_dir, PathBuf::from("/srv/ditto"));
        assert_eq!(config.dataset.preview_row_limit, Some(10));
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.host, "0.0.0.0");
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let err = Config::from_json(r#"{"log_level": "loud"}"#).unwrap_err();
        assert_eq!(err.code_str(), "DITTO_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_zero_upload_limit_rejected() {
        assert!(Config::from_json(r#"{"max_upload_bytes": 0}"#).is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = Config::load(&temp.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code_str(), "DITTO_CLI_CONFIG_ERROR");
    }
}
