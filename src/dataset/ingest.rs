//! # Ingestion Pipeline
//!
//! Upload bytes -> scratch file -> parsed CSV -> new store -> schema read back
//! from the store. The scratch file is removed when ingestion returns, on every
//! path. No store is created if parsing fails; a store whose load fails is
//! removed again.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use tempfile::NamedTempFile;

use super::config::DatasetConfig;
use super::errors::{DatasetError, DatasetResult};
use super::handle::StoreManager;
use super::id::DatasetId;
use super::layout::DatasetLayout;
use super::table::{
    create_table_sql, quote_ident, read_schema, snapshot, ColumnType, DatasetSchema, Row,
    ROWS_TABLE, ROW_KEY,
};
use crate::observability::{log_event_with_fields, trace_event, Event, Logger};

/// Required upload extension
pub const CSV_EXTENSION: &str = ".csv";
/// Message returned with every successful upload
pub const UPLOAD_MESSAGE: &str = "File uploaded and processed successfully";

const MAX_ID_ATTEMPTS: usize = 8;

/// Result of a successful ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub dataset_id: DatasetId,
    pub schema: DatasetSchema,
    pub data: Vec<Row>,
    pub message: String,
}

/// Upload bytes persisted for the duration of one ingestion
struct ScratchFile {
    file: Option<NamedTempFile>,
}

impl ScratchFile {
    fn write(dir: &Path, bytes: &[u8]) -> DatasetResult<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("upload_")
            .suffix(CSV_EXTENSION)
            .tempfile_in(dir)
            .map_err(|e| DatasetError::storage("failed to create scratch file", e))?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file: Some(file) })
    }

    fn path(&self) -> DatasetResult<&Path> {
        self.file
            .as_ref()
            .map(|f| f.path())
            .ok_or_else(|| DatasetError::Internal("scratch file already removed".into()))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().display().to_string();
            match file.close() {
                Ok(()) => trace_event(Event::ScratchRemoved, &[("path", path.as_str())]),
                Err(e) => {
                    let reason = e.to_string();
                    Logger::warn(
                        "SCRATCH_REMOVE_FAILED",
                        &[("path", path.as_str()), ("reason", reason.as_str())],
                    )
                }
            }
        }
    }
}

/// CSV content after header normalization and type inference
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    pub columns: Vec<(String, ColumnType)>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Ingest an uploaded CSV file as a new dataset
pub fn ingest(
    stores: &StoreManager,
    config: &DatasetConfig,
    raw: &[u8],
    filename: &str,
) -> DatasetResult<IngestOutcome> {
    validate_filename(filename)?;
    if raw.len() as u64 > config.max_upload_bytes {
        return Err(DatasetError::PayloadTooLarge(
            raw.len() as u64,
            config.max_upload_bytes,
        ));
    }

    let scratch = ScratchFile::write(&stores.layout().scratch_dir(), raw)?;
    let parsed = parse_csv(scratch.path()?)?;

    let id = fresh_id(stores.layout())?;
    let (schema, data) = match load(stores, &id, &parsed, config.preview_row_limit) {
        Ok(loaded) => loaded,
        Err(e) => {
            discard(stores.layout(), &id);
            return Err(e);
        }
    };

    Ok(IngestOutcome {
        dataset_id: id,
        schema,
        data,
        message: UPLOAD_MESSAGE.to_string(),
    })
}

fn validate_filename(filename: &str) -> DatasetResult<()> {
    if filename.ends_with(CSV_EXTENSION) {
        Ok(())
    } else {
        Err(DatasetError::InvalidInput(
            "Only CSV files are supported".to_string(),
        ))
    }
}

fn fresh_id(layout: &DatasetLayout) -> DatasetResult<DatasetId> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = DatasetId::generate();
        if !layout.dataset_dir(&id).exists() {
            return Ok(id);
        }
    }
    Err(DatasetError::Internal(
        "could not allocate an unused dataset id".to_string(),
    ))
}

fn load(
    stores: &StoreManager,
    id: &DatasetId,
    parsed: &ParsedTable,
    preview_limit: Option<usize>,
) -> DatasetResult<(DatasetSchema, Vec<Row>)> {
    let mut handle = stores.create(id)?;

    write_rows(handle.conn_mut()?, parsed)
        .map_err(|e| DatasetError::storage("failed to load rows", e))?;

    let conn = handle.conn()?;
    let schema = read_schema(conn).map_err(|e| DatasetError::storage("failed to read schema", e))?;
    let preview = snapshot(conn, preview_limit)
        .map_err(|e| DatasetError::storage("failed to read rows", e))?;

    handle.close()?;
    Ok((schema, preview.data))
}

fn write_rows(conn: &mut Connection, parsed: &ParsedTable) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(&create_table_sql(&parsed.columns))?;
    {
        let names: Vec<String> = parsed.columns.iter().map(|(n, _)| quote_ident(n)).collect();
        let placeholders = vec!["?"; parsed.columns.len()].join(", ");
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            ROWS_TABLE,
            names.join(", "),
            placeholders
        ))?;

        for row in &parsed.rows {
            let values = row
                .iter()
                .zip(parsed.columns.iter())
                .map(|(cell, (_, ty))| typed_value(cell.as_deref(), *ty));
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()
}

/// Remove a partially created dataset
fn discard(layout: &DatasetLayout, id: &DatasetId) {
    let dir = layout.dataset_dir(id);
    if dir.exists() {
        match fs::remove_dir_all(&dir) {
            Ok(()) => log_event_with_fields(Event::DatasetDiscarded, &[("dataset_id", id.as_str())]),
            Err(e) => {
                let reason = e.to_string();
                Logger::error(
                    "DATASET_DISCARD_FAILED",
                    &[("dataset_id", id.as_str()), ("reason", reason.as_str())],
                )
            }
        }
    }
}

/// Parse a CSV file with a header row
pub fn parse_csv(path: &Path) -> DatasetResult<ParsedTable> {
    let invalid = |e: csv::Error| DatasetError::InvalidInput(format!("Invalid CSV: {}", e));

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)
        .map_err(invalid)?;

    let headers = reader.headers().map_err(invalid)?.clone();
    if headers.is_empty() {
        return Err(DatasetError::InvalidInput(
            "Invalid CSV: missing header row".to_string(),
        ));
    }
    let names = normalize_headers(headers.iter())?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(invalid)?;
        rows.push(
            record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect::<Vec<_>>(),
        );
    }

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let ty = infer_type(rows.iter().filter_map(|row| row[i].as_deref()));
            (name, ty)
        })
        .collect();

    Ok(ParsedTable { columns, rows })
}

/// Blank names become `column<N>`; duplicates (case-insensitive, as SQLite
/// compares identifiers) get `_<n>` suffixes.
fn normalize_headers<'a>(raw: impl Iterator<Item = &'a str>) -> DatasetResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for (i, header) in raw.enumerate() {
        let trimmed = header.trim();
        let base = if trimmed.is_empty() {
            format!("column{}", i)
        } else {
            trimmed.to_string()
        };

        if base.eq_ignore_ascii_case(ROW_KEY) {
            return Err(DatasetError::InvalidInput(format!(
                "Column name '{}' is reserved",
                base
            )));
        }

        let mut name = base.clone();
        let mut suffix = 1;
        while !seen.insert(name.to_lowercase()) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        names.push(name);
    }

    Ok(names)
}

fn is_bool(s: &str) -> bool {
    s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false")
}

fn is_double(s: &str) -> bool {
    // Rejects "inf" / "NaN" which f64 parsing would accept
    s.bytes().any(|b| b.is_ascii_digit()) && s.parse::<f64>().map_or(false, f64::is_finite)
}

fn is_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Narrowest type accepting every present value
pub fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let (mut boolean, mut bigint, mut double, mut date) = (true, true, true, true);
    let mut any = false;

    for value in values {
        let v = value.trim();
        any = true;
        boolean &= is_bool(v);
        bigint &= v.parse::<i64>().is_ok();
        double &= is_double(v);
        date &= is_date(v);
        if !(boolean || bigint || double || date) {
            break;
        }
    }

    if !any {
        ColumnType::Varchar
    } else if boolean {
        ColumnType::Boolean
    } else if bigint {
        ColumnType::BigInt
    } else if double {
        ColumnType::Double
    } else if date {
        ColumnType::Date
    } else {
        ColumnType::Varchar
    }
}

fn typed_value(cell: Option<&str>, ty: ColumnType) -> SqlValue {
    let Some(raw) = cell else {
        return SqlValue::Null;
    };
    let v = raw.trim();
    match ty {
        ColumnType::Boolean => SqlValue::Integer(i64::from(v.eq_ignore_ascii_case("true"))),
        ColumnType::BigInt => v
            .parse::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
        ColumnType::Double => v
            .parse::<f64>()
            .map(SqlValue::Real)
            .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
        ColumnType::Date => SqlValue::Text(v.to_string()),
        ColumnType::Varchar => SqlValue::Text(raw.to_string()),
    }
}
