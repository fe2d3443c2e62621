use axum::Router;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roster::api::{self, AppState};
use roster::config::Config;
use roster::db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roster=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting roster server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Bring the database to ready - created, pooled, pinged, migrated -
    // before anything can serve a request. A failure here is fatal and
    // happens before any port is opened.
    let mut database = Database::new(config.database.clone());
    database.init().await?;

    // Build application state around the live pool handle
    let state = AppState {
        pool: database.pool()?.clone(),
        config: config.clone(),
    };

    // Build router
    let app = Router::new()
        .merge(api::version::router())
        .merge(api::health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    // Serve on a dedicated task; the main task only waits for a signal
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, cleaning up...");

    // Stop accepting requests, then release the pool. Close failures are
    // logged and swallowed - the process is exiting either way.
    server.abort();
    if let Err(e) = database.close().await {
        tracing::error!(error = %e, "Error closing database");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
