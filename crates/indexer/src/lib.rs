//! Launchpad indexer service.
//!
//! Runs the ingestion pipeline against a record store and serves the
//! projected records over a read-only HTTP API, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use ingestion::PipelineHandle;
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::RecordReader;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
///
/// Handlers only see the read side of the store; the pipeline is the sole
/// writer.
pub struct AppState {
    pub reader: Arc<dyn RecordReader>,
    pub pipeline: Option<PipelineHandle>,
}

impl AppState {
    pub fn new(reader: Arc<dyn RecordReader>) -> Self {
        Self {
            reader,
            pipeline: None,
        }
    }

    /// Reports this pipeline's state on `/health`.
    pub fn with_pipeline(mut self, handle: PipelineHandle) -> Self {
        self.pipeline = Some(handle);
        self
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/launches", get(routes::launches::list))
        .route("/launches/by-tx/{hash}", get(routes::launches::get_by_tx))
        .route("/launches/{address}", get(routes::launches::get))
        .route(
            "/launches/{address}/transactions",
            get(routes::launches::transactions),
        )
        .route("/transactions/{transfer_id}", get(routes::transactions::get))
        .route("/dead-letters", get(routes::dead_letters::list))
        .route("/cursors/{source_id}", get(routes::cursors::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
