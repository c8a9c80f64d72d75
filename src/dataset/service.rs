//! # Dataset Service
//!
//! Entry point used by the HTTP server and the CLI. Resolves caller supplied
//! ids, records metrics and wraps every operation in an observation scope.
//! All methods block; async callers should run them on a blocking thread.

use std::sync::Arc;

use serde_json::Value;

use super::config::DatasetConfig;
use super::errors::{DatasetError, DatasetResult};
use super::handle::{AccessMode, DatasetLocks, StoreManager};
use super::id::DatasetId;
use super::ingest::{ingest, IngestOutcome};
use super::layout::DatasetLayout;
use super::mutation::{add_row, delete_row, update_cell};
use super::query::execute;
use super::table::{read_schema, DatasetSchema, Row, TableData};
use crate::context::CallerContext;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};

/// Ingests, queries and edits datasets under one data directory
#[derive(Debug)]
pub struct DatasetService {
    config: DatasetConfig,
    stores: StoreManager,
    locks: DatasetLocks,
    metrics: Arc<MetricsRegistry>,
}

impl DatasetService {
    /// Open the service, creating the data directory if needed
    pub fn open(config: DatasetConfig) -> DatasetResult<Self> {
        Self::with_metrics(config, Arc::new(MetricsRegistry::new()))
    }

    /// Open the service reporting into an existing registry
    pub fn with_metrics(config: DatasetConfig, metrics: Arc<MetricsRegistry>) -> DatasetResult<Self> {
        config.validate().map_err(DatasetError::InvalidInput)?;

        let layout = DatasetLayout::new(&config.data_dir);
        layout.ensure_dirs()?;
        let stores = StoreManager::new(layout, config.busy_timeout(), Arc::clone(&metrics));

        Ok(Self {
            config,
            stores,
            locks: DatasetLocks::new(),
            metrics,
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn layout(&self) -> &DatasetLayout {
        self.stores.layout()
    }

    /// Whether `dataset_id` names an existing dataset
    pub fn exists(&self, dataset_id: &str) -> bool {
        DatasetId::parse(dataset_id).map_or(false, |id| self.stores.layout().exists(&id))
    }

    /// Ingest an uploaded CSV file
    pub fn upload(
        &self,
        ctx: &CallerContext,
        bytes: &[u8],
        filename: &str,
    ) -> DatasetResult<IngestOutcome> {
        let request_id = ctx.request_id.to_string();
        let scope = ObservationScope::new(
            "INGEST",
            &[
                ("request_id", request_id.as_str()),
                ("caller", ctx.caller_name()),
                ("filename", filename),
            ],
        );

        match ingest(&self.stores, &self.config, bytes, filename) {
            Ok(outcome) => {
                self.metrics.increment_datasets_ingested();
                let rows = outcome.schema.row_count.to_string();
                log_event_with_fields(
                    Event::DatasetIngested,
                    &[
                        ("dataset_id", outcome.dataset_id.as_str()),
                        ("rows", rows.as_str()),
                    ],
                );
                scope.complete(&[("dataset_id", outcome.dataset_id.as_str())]);
                Ok(outcome)
            }
            Err(e) => {
                self.metrics.increment_ingest_failures();
                scope.fail(e.code(), &e.to_string());
                Err(e)
            }
        }
    }

    /// Run a read-only query against a dataset
    pub fn query(
        &self,
        ctx: &CallerContext,
        dataset_id: &str,
        sql: &str,
    ) -> DatasetResult<TableData> {
        let scope = self.scope("QUERY", ctx, dataset_id);
        let result = resolve(dataset_id).and_then(|id| execute(&self.stores, &id, sql));

        match &result {
            Ok(data) => {
                self.metrics.increment_queries_executed();
                let rows = data.row_count().to_string();
                log_event_with_fields(
                    Event::QueryExecuted,
                    &[("dataset_id", dataset_id), ("rows", rows.as_str())],
                );
                scope.complete(&[("rows", rows.as_str())]);
            }
            Err(e @ DatasetError::QueryRejected(_)) => {
                self.metrics.increment_queries_rejected();
                let reason = e.to_string();
                log_event_with_fields(
                    Event::QueryRejected,
                    &[("dataset_id", dataset_id), ("reason", reason.as_str())],
                );
                scope.fail(e.code(), &reason);
            }
            Err(e) => scope.fail(e.code(), &e.to_string()),
        }
        result
    }

    /// Schema read back from the dataset's store
    pub fn schema(&self, ctx: &CallerContext, dataset_id: &str) -> DatasetResult<DatasetSchema> {
        let scope = self.scope("SCHEMA", ctx, dataset_id);
        let result = resolve(dataset_id).and_then(|id| {
            self.stores.with_store(&id, AccessMode::ReadOnly, |handle| {
                read_schema(handle.conn()?).map_err(|e| DatasetError::Query(e.to_string()))
            })
        });

        match &result {
            Ok(_) => scope.complete(&[]),
            Err(e) => scope.fail(e.code(), &e.to_string()),
        }
        result
    }

    /// Append a row; omitted columns get the default cell value
    pub fn add_row(
        &self,
        ctx: &CallerContext,
        dataset_id: &str,
        values: &Row,
    ) -> DatasetResult<TableData> {
        let scope = self.scope("ADD_ROW", ctx, dataset_id);
        let result =
            resolve(dataset_id).and_then(|id| add_row(&self.stores, &self.locks, &id, values));

        self.finish_mutation(scope, &result, Event::RowInserted, dataset_id, || {
            self.metrics.increment_rows_inserted()
        });
        result
    }

    /// Delete the row at zero-based ordinal `index`
    pub fn delete_row(
        &self,
        ctx: &CallerContext,
        dataset_id: &str,
        index: usize,
    ) -> DatasetResult<TableData> {
        let scope = self.scope("DELETE_ROW", ctx, dataset_id);
        let result =
            resolve(dataset_id).and_then(|id| delete_row(&self.stores, &self.locks, &id, index));

        self.finish_mutation(scope, &result, Event::RowDeleted, dataset_id, || {
            self.metrics.increment_rows_deleted()
        });
        result
    }

    /// Set one cell of the row at zero-based ordinal `index`
    pub fn update_cell(
        &self,
        ctx: &CallerContext,
        dataset_id: &str,
        index: usize,
        column: &str,
        value: &Value,
    ) -> DatasetResult<TableData> {
        let scope = self.scope("UPDATE_CELL", ctx, dataset_id);
        let result = resolve(dataset_id).and_then(|id| {
            update_cell(&self.stores, &self.locks, &id, index, column, value)
        });

        self.finish_mutation(scope, &result, Event::CellUpdated, dataset_id, || {
            self.metrics.increment_cells_updated()
        });
        result
    }

    fn scope(&self, name: &'static str, ctx: &CallerContext, dataset_id: &str) -> ObservationScope {
        let request_id = ctx.request_id.to_string();
        ObservationScope::new(
            name,
            &[
                ("request_id", request_id.as_str()),
                ("caller", ctx.caller_name()),
                ("dataset_id", dataset_id),
            ],
        )
    }

    fn finish_mutation(
        &self,
        scope: ObservationScope,
        result: &DatasetResult<TableData>,
        event: Event,
        dataset_id: &str,
        count: impl FnOnce(),
    ) {
        match result {
            Ok(data) => {
                count();
                let rows = data.row_count().to_string();
                log_event_with_fields(event, &[("dataset_id", dataset_id), ("rows", rows.as_str())]);
                scope.complete(&[("rows", rows.as_str())]);
            }
            Err(e) => {
                if matches!(e, DatasetError::Mutation(_) | DatasetError::Storage(_)) {
                    self.metrics.increment_mutation_failures();
                }
                scope.fail(e.code(), &e.to_string());
            }
        }
    }
}

/// Ids that cannot name a dataset resolve to `NotFound`
fn resolve(dataset_id: &str) -> DatasetResult<DatasetId> {
    DatasetId::parse(dataset_id).ok_or_else(|| DatasetError::NotFound(dataset_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn service() -> (TempDir, DatasetService) {
        let temp = TempDir::new().unwrap();
        let service = DatasetService::open(DatasetConfig::with_data_dir(temp.path())).unwrap();
        (temp, service)
    }

    #[test]
    fn test_invalid_id_is_not_found() {
        let (_temp, service) = service();
        let ctx = CallerContext::anonymous();

        let result = service.query(&ctx, "../../etc/passwd", "SELECT 1");
        assert!(matches!(result, Err(DatasetError::NotFound(_))));
        assert!(!service.exists("../../etc/passwd"));
    }

    #[test]
    fn test_metrics_follow_operations() {
        let (_temp, service) = service();
        let ctx = CallerContext::local();

        let id = service.upload(&ctx, b"a\n1\n", "m.csv").unwrap().dataset_id;
        service.query(&ctx, id.as_str(), "SELECT * FROM data").unwrap();
        let _ = service.query(&ctx, id.as_str(), "DELETE FROM data");
        service
            .add_row(&ctx, id.as_str(), json!({"a": 2}).as_object().unwrap())
            .unwrap();
        service.delete_row(&ctx, id.as_str(), 0).unwrap();
        service.update_cell(&ctx, id.as_str(), 0, "a", &json!(5)).unwrap();

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.datasets_ingested, 1);
        assert_eq!(snapshot.queries_executed, 1);
        assert_eq!(snapshot.queries_rejected, 1);
        assert_eq!(snapshot.rows_inserted, 1);
        assert_eq!(snapshot.rows_deleted, 1);
        assert_eq!(snapshot.cells_updated, 1);
        assert_eq!(snapshot.open_store_handles, 0);
    }

    #[test]
    fn test_schema_tracks_mutations() {
        let (_temp, service) = service();
        let ctx = CallerContext::local();

        let id = service.upload(&ctx, b"a,b\n1,x\n", "s.csv").unwrap().dataset_id;
        service
            .add_row(&ctx, id.as_str(), json!({"a": 2}).as_object().unwrap())
            .unwrap();

        let schema = service.schema(&ctx, id.as_str()).unwrap();
        assert_eq!(schema.columns, vec!["a", "b"]);
        assert_eq!(schema.row_count, 2);
        assert_eq!(schema.dtypes["b"], "VARCHAR");
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let temp = TempDir::new().unwrap();
        let mut config = DatasetConfig::with_data_dir(temp.path());
        config.max_upload_bytes = 0;
        assert!(matches!(
            DatasetService::open(config),
            Err(DatasetError::InvalidInput(_))
        ));
    }
}
