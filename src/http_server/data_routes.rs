//! Data HTTP Routes
//!
//! Upload, query and row editing endpoints. Handlers only translate between
//! HTTP and [`DatasetService`]; the service calls block, so they run on the
//! blocking pool.

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ApiError;
use crate::context::CallerContext;
use crate::dataset::ingest::{IngestOutcome, CSV_EXTENSION};
use crate::dataset::{DatasetError, DatasetResult, DatasetSchema, DatasetService, Row, TableData};

/// Header naming the caller of a request
pub const CALLER_HEADER: &str = "x-caller-id";
/// Multipart field carrying the uploaded file
pub const UPLOAD_FIELD: &str = "file";

const MAX_CALLER_LEN: usize = 64;

// ==================
// Shared State
// ==================

/// Data state shared across handlers
pub struct DataState {
    pub service: Arc<DatasetService>,
}

impl DataState {
    pub fn new(service: Arc<DatasetService>) -> Self {
        Self { service }
    }
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub dataset_id: String,
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct AddRowRequest {
    pub dataset_id: String,
    #[serde(default)]
    pub row: Row,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRowRequest {
    pub dataset_id: String,
    pub index: usize,
}

/// `index`, `column` and `value` are all required; they are optional here so
/// a missing one is reported by name. A `null` value counts as missing.
#[derive(Debug, Deserialize)]
pub struct UpdateCellRequest {
    pub dataset_id: String,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiUrlQuery {
    pub dataset_id: String,
}

#[derive(Debug, Serialize)]
pub struct ApiUrlResponse {
    pub api_url: String,
}

// ==================
// Data Routes
// ==================

/// Create data routes
pub fn data_routes(state: Arc<DataState>) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/query", post(query_handler))
        .route("/add_row", post(add_row_handler))
        .route("/delete_row", post(delete_row_handler))
        .route("/update_cell", post(update_cell_handler))
        .route("/datasets/:dataset_id/schema", get(schema_handler))
        .route("/generate_api_url", post(generate_api_url_handler))
        .route("/api/data/:username/:dataset_id", get(dataset_data_handler))
        .with_state(state)
}

// ==================
// Helper Functions
// ==================

/// Caller context from request headers. Malformed caller ids are ignored.
pub fn caller_context_from_headers(headers: &HeaderMap) -> CallerContext {
    let caller = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| {
            !v.is_empty()
                && v.len() <= MAX_CALLER_LEN
                && v.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
        });

    match caller {
        Some(name) => CallerContext::new(name),
        None => CallerContext::anonymous(),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> DatasetResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(DatasetError::Internal(e.to_string())))?
        .map_err(ApiError)
}

/// Body-limit failures surface while reading a field; they are the upload
/// size limit, not a malformed request
fn multipart_error(e: MultipartError, headers: &HeaderMap, max_upload_bytes: u64) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_else(|| max_upload_bytes.saturating_add(1));
        ApiError(DatasetError::PayloadTooLarge(size, max_upload_bytes))
    } else {
        ApiError::bad_request(e.body_text())
    }
}

// ==================
// Handlers
// ==================

async fn upload_handler(
    State(state): State<Arc<DataState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let ctx = caller_context_from_headers(&headers);
    let max_upload_bytes = state.service.config().max_upload_bytes;
    let mut multipart = multipart?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, &headers, max_upload_bytes))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("Uploaded file has no filename"))?;
        if !filename.ends_with(CSV_EXTENSION) {
            return Err(ApiError::bad_request("Only CSV files are supported"));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, &headers, max_upload_bytes))?;

        let service = Arc::clone(&state.service);
        let outcome = run_blocking(move || service.upload(&ctx, &data, &filename)).await?;
        return Ok(Json(outcome));
    }

    Err(ApiError::bad_request(format!(
        "Missing multipart field '{}'",
        UPLOAD_FIELD
    )))
}

async fn query_handler(
    State(state): State<Arc<DataState>>,
    headers: HeaderMap,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<TableData>, ApiError> {
    let ctx = caller_context_from_headers(&headers);
    let Json(request) = request?;
    let service = Arc::clone(&state.service);

    let data = run_blocking(move || service.query(&ctx, &request.dataset_id, &request.query)).await?;
    Ok(Json(data))
}

async fn add_row_handler(
    State(state): State<Arc<DataState>>,
    headers: HeaderMap,
    request: Result<Json<AddRowRequest>, JsonRejection>,
) -> Result<Json<TableData>, ApiError> {
    let ctx = caller_context_from_headers(&headers);
    let Json(request) = request?;
    let service = Arc::clone(&state.service);

    let data =
        run_blocking(move || service.add_row(&ctx, &request.dataset_id, &request.row)).await?;
    Ok(Json(data))
}

async fn delete_row_handler(
    State(state): State<Arc<DataState>>,
    headers: HeaderMap,
    request: Result<Json<DeleteRowRequest>, JsonRejection>,
) -> Result<Json<TableData>, ApiError> {
    let ctx = caller_context_from_headers(&headers);
    let Json(request) = request?;
    let service = Arc::clone(&state.service);

    let data =
        run_blocking(move || service.delete_row(&ctx, &request.dataset_id, request.index)).await?;
    Ok(Json(data))
}

async fn update_cell_handler(
    State(state): State<Arc<DataState>>,
    headers: HeaderMap,
    request: Result<Json<UpdateCellRequest>, JsonRejection>,
) -> Result<Json<TableData>, ApiError> {
    let ctx = caller_context_from_headers(&headers);
    let Json(request) = request?;

    let index = request
        .index
        .ok_or_else(|| ApiError::bad_request("Missing required field: index"))?;
    let column = request
        .column
        .ok_or_else(|| ApiError::bad_request("Missing required field: column"))?;
    let value = request
        .value
        .ok_or_else(|| ApiError::bad_request("Missing required field: value"))?;

    let service = Arc::clone(&state.service);
    let dataset_id = request.dataset_id;
    let data = run_blocking(move || {
        service.update_cell(&ctx, &dataset_id, index, &column, &value)
    })
    .await?;
    Ok(Json(data))
}

async fn schema_handler(
    State(state): State<Arc<DataState>>,
    headers: HeaderMap,
    Path(dataset_id): Path<String>,
) -> Result<Json<DatasetSchema>, ApiError> {
    let ctx = caller_context_from_headers(&headers);
    let service = Arc::clone(&state.service);

    let schema = run_blocking(move || service.schema(&ctx, &dataset_id)).await?;
    Ok(Json(schema))
}

async fn generate_api_url_handler(
    State(state): State<Arc<DataState>>,
    headers: HeaderMap,
    query: Result<Query<ApiUrlQuery>, QueryRejection>,
) -> Result<Json<ApiUrlResponse>, ApiError> {
    let ctx = caller_context_from_headers(&headers);
    let Query(query) = query?;

    if !state.service.exists(&query.dataset_id) {
        return Err(ApiError(DatasetError::NotFound(query.dataset_id)));
    }

    Ok(Json(ApiUrlResponse {
        api_url: format!("/data/api/data/{}/{}", ctx.caller_name(), query.dataset_id),
    }))
}

/// Full table of a dataset. The username segment only scopes the URL.
async fn dataset_data_handler(
    State(state): State<Arc<DataState>>,
    Path((username, dataset_id)): Path<(String, String)>,
) -> Result<Json<TableData>, ApiError> {
    let ctx = CallerContext::new(username);
    let service = Arc::clone(&state.service);

    let sql = format!("SELECT * FROM {}", crate::dataset::TABLE_NAME);
    let data = run_blocking(move || service.query(&ctx, &dataset_id, &sql)).await?;
    Ok(Json(data))
}
