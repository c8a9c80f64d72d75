//! # Dataset Errors
//!
//! One error type covers ingestion, query and mutation. Store messages are
//! passed through verbatim so callers can see why SQLite rejected a statement.

use thiserror::Error;

/// Result type for dataset operations
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Dataset layer errors
#[derive(Debug, Clone, Error)]
pub enum DatasetError {
    // Caller errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large: {0} bytes (max: {1})")]
    PayloadTooLarge(u64, u64),

    #[error("Dataset not found: {0}")]
    NotFound(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Row index {index} out of range (row count: {row_count})")]
    IndexOutOfRange { index: usize, row_count: u64 },

    // Store errors
    #[error("Query rejected: {0}")]
    QueryRejected(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Mutation failed: {0}")]
    Mutation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // Internal
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DatasetError {
    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            DatasetError::InvalidInput(_) => "DITTO_INVALID_INPUT",
            DatasetError::PayloadTooLarge(_, _) => "DITTO_PAYLOAD_TOO_LARGE",
            DatasetError::NotFound(_) => "DITTO_DATASET_NOT_FOUND",
            DatasetError::Schema(_) => "DITTO_SCHEMA_ERROR",
            DatasetError::IndexOutOfRange { .. } => "DITTO_INDEX_OUT_OF_RANGE",
            DatasetError::QueryRejected(_) => "DITTO_QUERY_REJECTED",
            DatasetError::Query(_) => "DITTO_QUERY_ERROR",
            DatasetError::Mutation(_) => "DITTO_MUTATION_ERROR",
            DatasetError::Storage(_) => "DITTO_STORAGE_ERROR",
            DatasetError::Internal(_) => "DITTO_INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            DatasetError::InvalidInput(_) => 400,
            DatasetError::PayloadTooLarge(_, _) => 413,
            DatasetError::NotFound(_) => 404,
            DatasetError::Schema(_) => 400,
            DatasetError::IndexOutOfRange { .. } => 400,
            DatasetError::QueryRejected(_) => 400,
            DatasetError::Query(_) => 500,
            DatasetError::Mutation(_) => 500,
            DatasetError::Storage(_) => 500,
            DatasetError::Internal(_) => 500,
        }
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        DatasetError::Storage(format!("{}: {}", context, err))
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(e: std::io::Error) -> Self {
        DatasetError::Storage(e.to_string())
    }
}
