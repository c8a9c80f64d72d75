//! CLI-specific error types
//!
//! Dataset failures keep their own code so scripts see the same codes as
//! HTTP clients.

use std::fmt;
use std::io;

use crate::dataset::DatasetError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (files, stdout)
    IoError,
    /// Malformed command argument
    InvalidArgument,
    /// Server failed to start
    BootFailed,
    /// Dataset operation failed
    Dataset(&'static str),
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "DITTO_CLI_CONFIG_ERROR",
            Self::IoError => "DITTO_CLI_IO_ERROR",
            Self::InvalidArgument => "DITTO_CLI_INVALID_ARGUMENT",
            Self::BootFailed => "DITTO_CLI_BOOT_FAILED",
            Self::Dataset(code) => code,
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Malformed argument
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidArgument, msg)
    }

    /// Boot failed
    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<DatasetError> for CliError {
    fn from(e: DatasetError) -> Self {
        Self::new(CliErrorCode::Dataset(e.code()), e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_error_keeps_code() {
        let err = CliError::from(DatasetError::NotFound("abc".into()));
        assert_eq!(err.code_str(), DatasetError::NotFound("abc".into()).code());
        assert!(err.message().contains("abc"));
    }

    #[test]
    fn test_display_includes_code() {
        let err = CliError::config_error("bad port");
        assert_eq!(err.to_string(), "DITTO_CLI_CONFIG_ERROR: bad port");
    }
}
