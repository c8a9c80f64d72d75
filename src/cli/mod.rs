//! CLI module for DittoBase
//!
//! Provides command-line interface for:
//! - serve: Run the HTTP server
//! - ingest: Load a CSV file into a new dataset
//! - query: One-shot read-only query
//! - schema: Print a dataset's schema
//! - add-row / delete-row / update-cell: Row editing

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{run, run_command};
pub use config::Config;
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
