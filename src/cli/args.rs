//! CLI argument definitions using clap
//!
//! Commands:
//! - dittobase serve [--port <port>]
//! - dittobase ingest <file>
//! - dittobase query <dataset_id> <sql>
//! - dittobase schema <dataset_id>
//! - dittobase add-row <dataset_id> <row_json>
//! - dittobase delete-row <dataset_id> <index>
//! - dittobase update-cell <dataset_id> <index> <column> <value>
//!
//! Every command accepts `--config <path>`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DittoBase - upload tabular files and query them with SQL
#[derive(Parser, Debug)]
#[command(name = "dittobase")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults apply when absent)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load a CSV file into a new dataset
    Ingest {
        /// Path to the CSV file
        file: PathBuf,
    },

    /// Run a read-only SQL statement against a dataset
    Query {
        dataset_id: String,
        /// SQL text; the table is named `data`
        sql: String,
    },

    /// Print the schema of a dataset
    Schema { dataset_id: String },

    /// Append a row given as a JSON object
    AddRow {
        dataset_id: String,
        /// e.g. '{"name": "Ana", "age": 30}'
        row: String,
    },

    /// Delete the row at a 0-based position
    DeleteRow { dataset_id: String, index: usize },

    /// Set one cell; the value is parsed as JSON, falling back to a plain string
    UpdateCell {
        dataset_id: String,
        index: usize,
        column: String,
        value: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_update_cell() {
        let cli = Cli::try_parse_from([
            "dittobase",
            "update-cell",
            "20240101_000000_abc",
            "2",
            "age",
            "41",
            "--config",
            "ditto.json",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("ditto.json")));
        match cli.command {
            Command::UpdateCell { index, column, .. } => {
                assert_eq!(index, 2);
                assert_eq!(column, "age");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_negative_index_rejected() {
        assert!(Cli::try_parse_from(["dittobase", "delete-row", "x", "-1"]).is_err());
    }
}
