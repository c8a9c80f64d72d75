//! HTTP error responses
//!
//! Every failure is rendered as `{"error": <message>, "code": <status>}` with
//! the matching status code.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::dataset::DatasetError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

/// A dataset error on its way to the client
#[derive(Debug)]
pub struct ApiError(pub DatasetError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(DatasetError::InvalidInput(message.into()))
    }
}

impl From<DatasetError> for ApiError {
    fn from(e: DatasetError) -> Self {
        Self(e)
    }
}

// Extractor rejections use the same body shape as every other error

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code,
            }),
        )
            .into_response()
    }
}
