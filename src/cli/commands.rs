//! CLI command implementations
//!
//! One-shot commands open the data directory, run a single dataset operation
//! and print its result as one JSON line. `serve` boots the HTTP server and
//! runs until the process is stopped.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use super::args::{Cli, Command};
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::write_response;
use crate::context::CallerContext;
use crate::dataset::{DatasetService, Row};
use crate::http_server::HttpServer;
use crate::observability::{log_event, log_event_with_fields, Event, Logger, Severity};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.config.as_deref(), cli.command)
}

/// Run `cmd` with the configuration at `config_path`
pub fn run_command(config_path: Option<&Path>, cmd: Command) -> CliResult<()> {
    let config = Config::load_or_default(config_path)?;
    let severity = config.severity()?;

    match cmd {
        Command::Serve { port } => {
            Logger::set_min_severity(severity);
            serve(config, port)
        }
        other => {
            // stdout carries the command result
            Logger::set_min_severity(severity.max(Severity::Error));
            let service = open_service(&config)?;
            execute(&service, other)
        }
    }
}

fn open_service(config: &Config) -> CliResult<DatasetService> {
    Ok(DatasetService::open(config.dataset.clone())?)
}

fn execute(service: &DatasetService, cmd: Command) -> CliResult<()> {
    let ctx = CallerContext::local();

    match cmd {
        Command::Serve { .. } => Err(CliError::invalid_argument(
            "serve is not a one-shot command",
        )),
        Command::Ingest { file } => {
            let (bytes, filename) = read_upload(&file)?;
            let outcome = service.upload(&ctx, &bytes, &filename)?;
            write_response(&outcome)
        }
        Command::Query { dataset_id, sql } => {
            let data = service.query(&ctx, &dataset_id, &sql)?;
            write_response(&data)
        }
        Command::Schema { dataset_id } => {
            let schema = service.schema(&ctx, &dataset_id)?;
            write_response(&schema)
        }
        Command::AddRow { dataset_id, row } => {
            let row = parse_row(&row)?;
            let data = service.add_row(&ctx, &dataset_id, &row)?;
            write_response(&data)
        }
        Command::DeleteRow { dataset_id, index } => {
            let data = service.delete_row(&ctx, &dataset_id, index)?;
            write_response(&data)
        }
        Command::UpdateCell {
            dataset_id,
            index,
            column,
            value,
        } => {
            let value = parse_cell_value(&value);
            let data = service.update_cell(&ctx, &dataset_id, index, &column, &value)?;
            write_response(&data)
        }
    }
}

/// Boot the HTTP server
pub fn serve(config: Config, port: Option<u16>) -> CliResult<()> {
    log_event(Event::BootStart);

    let mut http = config.http.clone();
    if let Some(port) = port {
        http.port = port;
    }

    let data_dir = config.dataset.data_dir.display().to_string();
    log_event_with_fields(
        Event::ConfigLoaded,
        &[("data_dir", data_dir.as_str()), ("log_level", config.log_level.as_str())],
    );

    let service = match DatasetService::open(config.dataset) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            let reason = e.to_string();
            log_event_with_fields(Event::BootFailed, &[("reason", reason.as_str())]);
            return Err(CliError::boot_failed(reason));
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::boot_failed(format!("Failed to start runtime: {}", e)))?;

    let server = HttpServer::with_config(http, service);
    runtime.block_on(server.start()).map_err(|e| {
        let reason = e.to_string();
        log_event_with_fields(Event::BootFailed, &[("reason", reason.as_str())]);
        CliError::boot_failed(reason)
    })
}

fn read_upload(path: &Path) -> CliResult<(Vec<u8>, String)> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| CliError::invalid_argument("File path has no file name"))?;

    let bytes = fs::read(path)
        .map_err(|e| CliError::io_error(format!("Failed to read {}: {}", path.display(), e)))?;

    Ok((bytes, filename))
}

fn parse_row(text: &str) -> CliResult<Row> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(CliError::invalid_argument("Row must be a JSON object")),
        Err(e) => Err(CliError::invalid_argument(format!("Invalid row JSON: {}", e))),
    }
}

/// JSON when it parses, otherwise the raw text as a string
fn parse_cell_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
