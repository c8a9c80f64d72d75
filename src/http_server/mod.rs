//! # DittoBase HTTP Server Module
//!
//! Axum server exposing the dataset service.
//!
//! # Endpoints
//!
//! - `/` - Welcome message
//! - `/health` - Health check
//! - `/metrics` - Counters
//! - `/data/*` - Upload, query and row editing

pub mod config;
pub mod data_routes;
pub mod errors;
pub mod observability_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ErrorResponse};
pub use server::HttpServer;
