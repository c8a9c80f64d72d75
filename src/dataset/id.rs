//! # Dataset Identifiers
//!
//! Ids are `<YYYYMMDD_HHMMSS>_<uuid simple>`. The timestamp keeps directory
//! listings readable; the uuid makes two uploads in the same second distinct.
//! Parsing only accepts `[A-Za-z0-9_-]` so an id is always a single, safe path
//! component.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum accepted id length
pub const MAX_ID_LEN: usize = 128;

/// Identifier of one ingested dataset
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    /// Generate a fresh id
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        Self(format!("{}_{}", stamp, Uuid::new_v4().simple()))
    }

    /// Parse a caller supplied id. Returns `None` for strings that can never
    /// name a dataset.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.len() > MAX_ID_LEN {
            return None;
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
