//! dittobase - upload tabular files and query them with SQL
//!
//! Each upload becomes an isolated dataset backed by its own embedded SQLite
//! store. Datasets can be queried read-only and edited row by row, by
//! 0-based position.

pub mod cli;
pub mod context;
pub mod dataset;
pub mod http_server;
pub mod observability;
