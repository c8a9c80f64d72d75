//! Dataset layer configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for storage, ingestion and store handles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Root directory holding every dataset (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum rows returned with an upload (default: no limit)
    #[serde(default)]
    pub preview_row_limit: Option<usize>,

    /// Maximum accepted upload size (default: 100 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// How long a handle waits on a locked store (default: 5000 ms)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            preview_row_limit: None,
            max_upload_bytes: default_max_upload_bytes(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatasetConfig {
    /// Default settings rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("data_dir must not be empty".to_string());
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be > 0".to_string());
        }
        if self.preview_row_limit == Some(0) {
            return Err("preview_row_limit must be > 0 when set".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatasetConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.preview_row_limit, None);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DatasetConfig =
            serde_json::from_str(r#"{"data_dir": "/var/lib/ditto", "preview_row_limit": 50}"#)
                .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ditto"));
        assert_eq!(config.preview_row_limit, Some(50));
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = DatasetConfig::default();
        config.max_upload_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = DatasetConfig::default();
        config.preview_row_limit = Some(0);
        assert!(config.validate().is_err());
    }
}
