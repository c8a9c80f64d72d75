//! # Row Mutation Engine
//!
//! Rows are addressed by zero-based ordinal: the rank of the row's surrogate
//! key, which is also the order `SELECT * FROM data` returns. Resolving the
//! ordinal and writing happen in one SQL statement, inside an `IMMEDIATE`
//! transaction, while holding the dataset's in-process write lock. The
//! returned projection is read inside the same transaction.
//!
//! An ordinal past the last row is an error; the dataset is left unchanged.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Transaction, TransactionBehavior};
use serde_json::Value;

use super::errors::{DatasetError, DatasetResult};
use super::handle::{AccessMode, DatasetLocks, StoreManager};
use super::id::DatasetId;
use super::table::{
    data_columns, json_to_sql, quote_ident, row_count, snapshot, Row, TableData, ROWS_TABLE,
    ROW_KEY,
};

/// Value stored for columns a new row leaves out
pub const DEFAULT_CELL_VALUE: &str = "";

fn mutation_err(e: rusqlite::Error) -> DatasetError {
    DatasetError::Mutation(e.to_string())
}

/// Sub-select resolving `OFFSET ?n` to a surrogate key
fn key_at_ordinal(param: usize) -> String {
    format!(
        "(SELECT {key} FROM {rows} ORDER BY {key} LIMIT 1 OFFSET ?{param})",
        key = ROW_KEY,
        rows = ROWS_TABLE,
        param = param
    )
}

/// Run one write under the dataset lock and return the post-write projection
fn mutate<F>(
    stores: &StoreManager,
    locks: &DatasetLocks,
    id: &DatasetId,
    write: F,
) -> DatasetResult<TableData>
where
    F: FnOnce(&Transaction<'_>) -> DatasetResult<()>,
{
    if !stores.layout().exists(id) {
        return Err(DatasetError::NotFound(id.to_string()));
    }

    locks.with_lock(id, || {
        stores.with_store(id, AccessMode::ReadWrite, |handle| {
            let conn = handle.conn_mut()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(mutation_err)?;

            // Dropping `tx` on error rolls back
            write(&tx)?;

            let data = snapshot(&tx, None).map_err(mutation_err)?;
            tx.commit().map_err(mutation_err)?;
            Ok(data)
        })
    })
}

fn column_names(tx: &Transaction<'_>) -> DatasetResult<Vec<String>> {
    Ok(data_columns(tx)
        .map_err(mutation_err)?
        .into_iter()
        .map(|(name, _)| name)
        .collect())
}

fn out_of_range(tx: &Transaction<'_>, index: usize) -> DatasetError {
    match row_count(tx) {
        Ok(row_count) => DatasetError::IndexOutOfRange { index, row_count },
        Err(e) => mutation_err(e),
    }
}

/// Append one row. Columns missing from `values` get [`DEFAULT_CELL_VALUE`].
pub fn add_row(
    stores: &StoreManager,
    locks: &DatasetLocks,
    id: &DatasetId,
    values: &Row,
) -> DatasetResult<TableData> {
    mutate(stores, locks, id, |tx| {
        let columns = column_names(tx)?;
        if columns.is_empty() {
            return Err(DatasetError::Schema("dataset has no columns".to_string()));
        }
        if let Some(unknown) = values.keys().find(|k| !columns.contains(*k)) {
            return Err(DatasetError::Schema(format!("Unknown column: {}", unknown)));
        }

        let row: Vec<SqlValue> = columns
            .iter()
            .map(|name| {
                values
                    .get(name)
                    .map(json_to_sql)
                    .unwrap_or_else(|| SqlValue::Text(DEFAULT_CELL_VALUE.to_string()))
            })
            .collect();

        let names: Vec<String> = columns.iter().map(|n| quote_ident(n)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        tx.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                ROWS_TABLE,
                names.join(", "),
                placeholders
            ),
            params_from_iter(row),
        )
        .map_err(mutation_err)?;
        Ok(())
    })
}

/// Delete the row at ordinal `index`
pub fn delete_row(
    stores: &StoreManager,
    locks: &DatasetLocks,
    id: &DatasetId,
    index: usize,
) -> DatasetResult<TableData> {
    mutate(stores, locks, id, |tx| {
        let Ok(offset) = i64::try_from(index) else {
            return Err(out_of_range(tx, index));
        };

        let deleted = tx
            .execute(
                &format!(
                    "DELETE FROM {} WHERE {} = {}",
                    ROWS_TABLE,
                    ROW_KEY,
                    key_at_ordinal(1)
                ),
                params![offset],
            )
            .map_err(mutation_err)?;

        if deleted == 0 {
            return Err(out_of_range(tx, index));
        }
        Ok(())
    })
}

/// Set one cell of the row at ordinal `index`
pub fn update_cell(
    stores: &StoreManager,
    locks: &DatasetLocks,
    id: &DatasetId,
    index: usize,
    column: &str,
    value: &Value,
) -> DatasetResult<TableData> {
    mutate(stores, locks, id, |tx| {
        let columns = column_names(tx)?;
        if !columns.iter().any(|c| c == column) {
            return Err(DatasetError::Schema(format!("Unknown column: {}", column)));
        }
        let Ok(offset) = i64::try_from(index) else {
            return Err(out_of_range(tx, index));
        };

        let updated = tx
            .execute(
                &format!(
                    "UPDATE {} SET {} = ?1 WHERE {} = {}",
                    ROWS_TABLE,
                    quote_ident(column),
                    ROW_KEY,
                    key_at_ordinal(2)
                ),
                params![json_to_sql(value), offset],
            )
            .map_err(mutation_err)?;

        if updated == 0 {
            return Err(out_of_range(tx, index));
        }
        Ok(())
    })
}
