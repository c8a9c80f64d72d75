//! Dataset Lifecycle Tests
//!
//! Upload through query and editing, against a real data directory:
//! - Uploaded rows come back unchanged and in file order
//! - Every upload lands in its own dataset
//! - Scratch files and store handles never outlive an operation
//! - Failed uploads leave nothing behind

use std::fs;
use std::sync::Arc;

use dittobase::context::CallerContext;
use dittobase::dataset::{DatasetConfig, DatasetError, DatasetService};
use dittobase::observability::MetricsRegistry;
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

const PEOPLE_CSV: &[u8] = b"name,age,city\nAna,30,Lisbon\nBo,41,Oslo\nCy,25,Rome\n";

fn create_service(temp_dir: &TempDir) -> DatasetService {
    DatasetService::open(DatasetConfig::with_data_dir(temp_dir.path())).unwrap()
}

fn scratch_entries(service: &DatasetService) -> usize {
    fs::read_dir(service.layout().scratch_dir()).unwrap().count()
}

fn dataset_dirs(temp_dir: &TempDir) -> Vec<String> {
    fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("dataset_"))
        .collect()
}

// =============================================================================
// Upload
// =============================================================================

#[test]
fn test_upload_returns_schema_and_rows_in_file_order() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);
    let ctx = CallerContext::anonymous();

    let outcome = service.upload(&ctx, PEOPLE_CSV, "people.csv").unwrap();

    assert_eq!(outcome.schema.columns, vec!["name", "age", "city"]);
    assert_eq!(outcome.schema.row_count, 3);
    assert_eq!(outcome.schema.dtypes.get("age").map(String::as_str), Some("BIGINT"));
    assert_eq!(outcome.schema.dtypes.get("name").map(String::as_str), Some("VARCHAR"));
    assert_eq!(outcome.message, "File uploaded and processed successfully");

    let names: Vec<_> = outcome.data.iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("Ana"), json!("Bo"), json!("Cy")]);
    assert_eq!(outcome.data[1]["age"], json!(41));
}

#[test]
fn test_full_table_query_matches_upload() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);
    let ctx = CallerContext::anonymous();

    let outcome = service.upload(&ctx, PEOPLE_CSV, "people.csv").unwrap();
    let data = service
        .query(&ctx, outcome.dataset_id.as_str(), "SELECT * FROM data")
        .unwrap();

    assert_eq!(data.columns, outcome.schema.columns);
    assert_eq!(data.data, outcome.data);
}

#[test]
fn test_each_upload_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);
    let ctx = CallerContext::anonymous();

    let first = service.upload(&ctx, PEOPLE_CSV, "people.csv").unwrap();
    let second = service.upload(&ctx, PEOPLE_CSV, "people.csv").unwrap();
    assert_ne!(first.dataset_id, second.dataset_id);

    service.delete_row(&ctx, first.dataset_id.as_str(), 0).unwrap();

    let untouched = service
        .query(&ctx, second.dataset_id.as_str(), "SELECT COUNT(*) AS n FROM data")
        .unwrap();
    assert_eq!(untouched.data[0]["n"], json!(3));
    assert_eq!(dataset_dirs(&temp_dir).len(), 2);
}

#[test]
fn test_upload_scenario_from_readme() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);
    let ctx = CallerContext::anonymous();

    let outcome = service
        .upload(&ctx, b"name,age\nAna,30\nBo,41\nCy,25\n", "people.csv")
        .unwrap();
    let id = outcome.dataset_id.as_str();

    let after_delete = service.delete_row(&ctx, id, 1).unwrap();
    assert_eq!(
        after_delete.data,
        vec![
            json!({"name": "Ana", "age": 30}).as_object().unwrap().clone(),
            json!({"name": "Cy", "age": 25}).as_object().unwrap().clone(),
        ]
    );

    let after_update = service.update_cell(&ctx, id, 1, "age", &json!(26)).unwrap();
    assert_eq!(after_update.data[1]["name"], json!("Cy"));
    assert_eq!(after_update.data[1]["age"], json!(26));
    assert_eq!(after_update.data[0]["age"], json!(30));
}

// =============================================================================
// Resource Release
// =============================================================================

#[test]
fn test_scratch_dir_empty_after_success_and_failure() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);
    let ctx = CallerContext::anonymous();

    service.upload(&ctx, PEOPLE_CSV, "people.csv").unwrap();
    assert_eq!(scratch_entries(&service), 0);

    let err = service
        .upload(&ctx, b"a,b\n1,2,3\n", "ragged.csv")
        .unwrap_err();
    assert!(matches!(err, DatasetError::InvalidInput(_)), "got {:?}", err);
    assert_eq!(scratch_entries(&service), 0);
}

#[test]
fn test_failed_upload_creates_no_dataset() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);
    let ctx = CallerContext::anonymous();

    assert!(service.upload(&ctx, b"", "empty.csv").is_err());
    assert!(service.upload(&ctx, PEOPLE_CSV, "people.xlsx").is_err());

    assert!(dataset_dirs(&temp_dir).is_empty());
}

#[test]
fn test_no_store_handles_left_open() {
    let temp_dir = TempDir::new().unwrap();
    let metrics = Arc::new(MetricsRegistry::new());
    let service = DatasetService::with_metrics(
        DatasetConfig::with_data_dir(temp_dir.path()),
        Arc::clone(&metrics),
    )
    .unwrap();
    let ctx = CallerContext::anonymous();

    let outcome = service.upload(&ctx, PEOPLE_CSV, "people.csv").unwrap();
    let id = outcome.dataset_id.as_str();

    let _ = service.query(&ctx, id, "SELECT * FROM data");
    let _ = service.query(&ctx, id, "DROP TABLE data");
    let _ = service.query(&ctx, id, "SELECT * FROM nowhere");
    let _ = service.add_row(&ctx, id, &serde_json::Map::new());
    let _ = service.delete_row(&ctx, id, 99);
    let _ = service.update_cell(&ctx, id, 0, "missing", &json!(1));
    let _ = service.schema(&ctx, id);

    assert_eq!(metrics.open_store_handles(), 0);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_dataset_survives_service_restart() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = CallerContext::anonymous();

    let id = {
        let service = create_service(&temp_dir);
        let outcome = service.upload(&ctx, PEOPLE_CSV, "people.csv").unwrap();
        service
            .update_cell(&ctx, outcome.dataset_id.as_str(), 0, "city", &json!("Porto"))
            .unwrap();
        outcome.dataset_id.to_string()
    };

    let service = create_service(&temp_dir);
    let schema = service.schema(&ctx, &id).unwrap();
    assert_eq!(schema.row_count, 3);

    let data = service
        .query(&ctx, &id, "SELECT city FROM data LIMIT 1")
        .unwrap();
    assert_eq!(data.data[0]["city"], json!("Porto"));
}
