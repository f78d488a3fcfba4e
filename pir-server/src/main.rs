//! PIR Server - REST API and topic subscriber for PIR services
//!
//! Run with: cargo run -p pir-server --release

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pir_server::{create_router, AppState, Backends, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pir_server=info,pir_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    let addr = config.socket_addr();
    tracing::info!("Starting PIR Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(agency = %config.agency, "Bind address: {}", addr);

    let backends = Backends::from_config(&config).await?;
    let state = AppState::new(config, backends);

    // Re-subscribe services published before the last restart
    let registered = state.initialize().await?;
    tracing::info!(registered, "Service registry initialized");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);
    // Peer addresses feed the rate limiter's key extractor
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
