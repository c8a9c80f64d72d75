//! # HTTP Server
//!
//! Combines the data and observability routers behind CORS and an upload
//! size limit.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::config::HttpServerConfig;
use super::data_routes::{data_routes, DataState};
use super::observability_routes::observability_routes;
use crate::dataset::DatasetService;
use crate::observability::{log_event_with_fields, Event};

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// HTTP Server for DittoBase
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a server for `service`
    pub fn with_config(config: HttpServerConfig, service: Arc<DatasetService>) -> Self {
        let router = Self::build_router(&config, service);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, service: Arc<DatasetService>) -> Router {
        let metrics = Arc::clone(service.metrics());
        let body_limit = usize::try_from(service.config().max_upload_bytes)
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD_BYTES);

        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(observability_routes(metrics))
            .nest("/data", data_routes(Arc::new(DataState::new(service))))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind and serve until the process exits
    pub async fn start(self) -> Result<(), io::Error> {
        let addr: SocketAddr = self
            .config
            .socket_addr()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{}", e)))?;

        let listener = TcpListener::bind(addr).await?;
        let addr_str = addr.to_string();
        log_event_with_fields(Event::Serving, &[("addr", addr_str.as_str())]);

        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
