//! Process wiring for the checkout core.
//!
//! Loads configuration, installs structured logging, and runs the reservation
//! sweeper next to an operational HTTP surface (`/health`, `/metrics`).

pub mod config;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use checkout::{EventPublisher, ExpirySweeper, InventoryLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{EventSink, InventoryStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use config::{Config, LogFormat};

/// State shared with the health endpoint.
#[derive(Debug, Clone)]
pub struct AppState {
    /// `"postgres"` or `"memory"`.
    pub store_backend: &'static str,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store_backend: &'static str) -> Self {
        Self {
            store_backend,
            started_at: Instant::now(),
        }
    }
}

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Builds the ledger over `store` and the sweeper that maintains it.
pub fn build_sweeper<S: InventoryStore + 'static>(
    store: S,
    sink: Arc<dyn EventSink>,
    config: &Config,
) -> ExpirySweeper<S> {
    let ledger = Arc::new(InventoryLedger::new(
        store,
        config.ledger,
        EventPublisher::new(sink),
    ));
    ExpirySweeper::new(ledger, config.sweeper)
}

/// Creates the Axum router for the operational endpoints.
pub fn create_app(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(state)
        .merge(metrics_router)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http())
}
