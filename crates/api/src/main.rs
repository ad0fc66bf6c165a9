//! API server entry point.

use api::config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

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

async fn serve<S: Store>(store: S, config: &Config, metrics_handle: PrometheusHandle) {
    let app = api::create_app(api::create_state(store), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store backend and serve
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections)
                .await
                .expect("failed to connect to database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!(
                max_connections = config.database_max_connections,
                "using PostgreSQL store"
            );
            serve(store, &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            serve(InMemoryStore::new(), &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
