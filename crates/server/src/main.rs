//! Checkout server entry point.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use server::{AppState, Config};
use sqlx::PgPool;
use store::{EventSink, InMemoryEventSink, InMemoryStore, InventoryStore, PostgresStore};
use tokio::signal;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn run<S: InventoryStore + 'static>(
    config: Config,
    store: S,
    sink: Arc<dyn EventSink>,
    backend: &'static str,
    metrics_handle: PrometheusHandle,
) {
    let sweeper = server::build_sweeper(store, sink, &config).spawn();
    let app = server::create_app(AppState::new(backend), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, store = backend, "starting checkout server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper.shutdown().await;
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    server::init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Select the store and run
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPool::connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            let sink: Arc<dyn EventSink> = Arc::new(store.clone());
            run(config, store, sink, "postgres", metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            let sink: Arc<dyn EventSink> = Arc::new(InMemoryEventSink::new());
            run(config, InMemoryStore::new(), sink, "memory", metrics_handle).await;
        }
    }
}
