//! # congomuv-server
//!
//! HTTP server for the CongoMuv gate.
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package congomuv-server
//!
//! # With a config file
//! CONGOMUV_CONFIG=./congomuv.toml ./congomuv-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::sync::Arc;

use congomuv_core::GateConfig;
use congomuv_server::api::create_router;
use congomuv_server::logging;
use congomuv_server::state::{self, AppState};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GateConfig::load_or_default()?;
    logging::init(config.server.production)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        idle_timeout_secs = config.idle.idle_timeout_secs,
        warn_duration_secs = config.idle.warn_duration_secs,
        "Starting congomuv-server"
    );

    let auth = config.auth_provider();
    if auth.is_empty() {
        warn!("Auth directory is empty, every sign-in will leave clients loading");
    }

    let addr = config.server.socket_addr()?;
    let client_ttl = config.server.client_ttl();
    let state = AppState::new(config, Arc::new(auth)).into_shared();
    let reaper = state::spawn_reaper(&state, client_ttl);

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive()),
    );

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
