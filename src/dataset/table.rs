//! # Table Layout and Value Conversion
//!
//! Every store holds one base table with a hidden surrogate key and a view
//! named [`TABLE_NAME`] that exposes the uploaded columns in key order:
//!
//! ```text
//! __dittobase_rows(__dittobase_row_key INTEGER PRIMARY KEY AUTOINCREMENT, a, b, ...)
//! data = SELECT a, b, ... FROM __dittobase_rows ORDER BY __dittobase_row_key
//! ```
//!
//! `AUTOINCREMENT` guarantees keys are never reused, so an appended row always
//! sorts last and ordinals of surviving rows never shift except by deletes.

use std::collections::{BTreeMap, HashSet};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Statement};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Logical table name used by every query
pub const TABLE_NAME: &str = "data";
/// Base table holding the rows and their surrogate keys
pub const ROWS_TABLE: &str = "__dittobase_rows";
/// Surrogate key column of [`ROWS_TABLE`]
pub const ROW_KEY: &str = "__dittobase_row_key";

/// One result row: column name to value, in column order
pub type Row = Map<String, Value>;

/// Column list plus row records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub data: Vec<Row>,
}

impl TableData {
    pub fn row_count(&self) -> usize {
        self.data.len()
    }
}

/// Schema metadata of a dataset, read back from its store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub columns: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
    pub row_count: u64,
}

/// Column types assigned at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Date,
    Varchar,
}

impl ColumnType {
    /// Declared SQL type name
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Date => "DATE",
            ColumnType::Varchar => "VARCHAR",
        }
    }
}

/// Quote an identifier for SQLite
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// DDL creating the base table and the `data` view
pub(crate) fn create_table_sql(columns: &[(String, ColumnType)]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql_name()))
        .collect();
    let names: Vec<String> = columns.iter().map(|(name, _)| quote_ident(name)).collect();

    let mut table_defs = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", ROW_KEY)];
    table_defs.extend(defs);

    format!(
        "CREATE TABLE {rows} ({defs});\n\
         CREATE VIEW {view} AS SELECT {names} FROM {rows} ORDER BY {key};",
        rows = ROWS_TABLE,
        defs = table_defs.join(", "),
        view = TABLE_NAME,
        names = names.join(", "),
        key = ROW_KEY,
    )
}

/// Current user-visible columns and their declared types, in order
pub(crate) fn data_columns(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT name, type FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let rows = stmt.query_map([ROWS_TABLE], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut columns = Vec::new();
    for row in rows {
        let (name, ty) = row?;
        if name != ROW_KEY {
            columns.push((name, ty));
        }
    }
    Ok(columns)
}

pub(crate) fn row_count(conn: &Connection) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", ROWS_TABLE),
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

pub(crate) fn read_schema(conn: &Connection) -> rusqlite::Result<DatasetSchema> {
    let columns = data_columns(conn)?;
    Ok(DatasetSchema {
        columns: columns.iter().map(|(name, _)| name.clone()).collect(),
        dtypes: columns.into_iter().collect(),
        row_count: row_count(conn)?,
    })
}

/// Full projection of the `data` view
pub(crate) fn snapshot(conn: &Connection, limit: Option<usize>) -> rusqlite::Result<TableData> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", TABLE_NAME))?;
    collect_rows(&mut stmt, limit)
}

/// Run a prepared statement and convert every row
pub(crate) fn collect_rows(
    stmt: &mut Statement<'_>,
    limit: Option<usize>,
) -> rusqlite::Result<TableData> {
    let (names, decls): (Vec<String>, Vec<Option<String>>) = stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
        .unzip();
    let columns: Vec<(String, Option<String>)> =
        unique_names(names).into_iter().zip(decls).collect();

    let mut rows = stmt.query([])?;
    let mut data = Vec::new();
    while let Some(row) = rows.next()? {
        if limit.map_or(false, |max| data.len() >= max) {
            break;
        }
        let mut record = Row::with_capacity(columns.len());
        for (i, (name, decl)) in columns.iter().enumerate() {
            record.insert(name.clone(), cell_to_json(row.get_ref(i)?, decl.as_deref()));
        }
        data.push(record);
    }

    Ok(TableData {
        columns: columns.into_iter().map(|(name, _)| name).collect(),
        data,
    })
}

/// Repeated result names (self-joins, clashing aliases) get `_<n>` suffixes
/// so every value keeps its own key
pub(crate) fn unique_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|base| {
            let mut name = base.clone();
            let mut suffix = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            name
        })
        .collect()
}

fn is_boolean(decl: Option<&str>) -> bool {
    decl.map_or(false, |d| d.eq_ignore_ascii_case("BOOLEAN"))
}

/// Convert a stored cell to JSON. NULL, NaN and infinities all become `null`.
pub fn cell_to_json(value: ValueRef<'_>, decl: Option<&str>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if is_boolean(decl) => Value::Bool(i != 0),
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(STANDARD.encode(b)),
    }
}

/// Convert a caller supplied JSON value to a bindable SQL value
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
