//! # Dataset Storage and Query Execution
//!
//! Each uploaded CSV file becomes one dataset: an isolated SQLite store
//! addressed only by its generated id.
//!
//! - [`layout`]: id to on-disk location, existence probes
//! - [`handle`]: scoped store handles and per-dataset write locks
//! - [`ingest`]: CSV upload to new store
//! - [`query`]: read-only SQL execution
//! - [`mutation`]: positional add/delete/update of rows
//! - [`service`]: the entry point tying them together

pub mod config;
pub mod errors;
pub mod handle;
pub mod id;
pub mod ingest;
pub mod layout;
pub mod mutation;
pub mod query;
pub mod service;
pub mod table;

pub use config::DatasetConfig;
pub use errors::{DatasetError, DatasetResult};
pub use handle::{AccessMode, DatasetLocks, StoreHandle, StoreManager};
pub use id::DatasetId;
pub use ingest::IngestOutcome;
pub use layout::DatasetLayout;
pub use service::DatasetService;
pub use table::{DatasetSchema, Row, TableData, TABLE_NAME};
