//! Axum HTTP server for the REST API
//!
//! The server runs on its own OS thread with a current-thread runtime, so
//! subprocess calls, gpsd reads and Kubernetes API calls on the main runtime
//! never stall request handling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{Error, Result};

use super::handlers::{self, ApiState};

/// Versioned path prefix of the API
pub const API_PREFIX: &str = "/api/v1";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8099;

/// Delay between bind attempts
pub const BIND_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Build the application router
pub fn router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        .route("/status", get(handlers::get_status))
        .route("/status/synced", get(handlers::get_synced))
        .route("/config", get(handlers::get_config));

    Router::new()
        .nest(API_PREFIX, api)
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr`, retrying every `retry_interval` until it succeeds
pub async fn bind_with_retry(addr: SocketAddr, retry_interval: Duration) -> TcpListener {
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return listener,
            Err(e) => {
                error!(
                    "Failed to bind for HTTP API on {}: {}. Retrying in {:?}",
                    addr, e, retry_interval
                );
                tokio::time::sleep(retry_interval).await;
            }
        }
    }
}

/// Run the REST API server
pub async fn run_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<()> {
    let listener = bind_with_retry(addr, BIND_RETRY_INTERVAL).await;
    info!("REST API server listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .map_err(Error::IoError)?;

    Ok(())
}

/// Run the REST API server on a dedicated single-threaded event loop
pub fn spawn_server_thread(
    state: Arc<ApiState>,
    addr: SocketAddr,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("api-server".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start REST API runtime: {}", e);
                    return;
                }
            };

            if let Err(e) = runtime.block_on(run_server(state, addr)) {
                error!("REST API server stopped: {}", e);
            }
        })?;

    Ok(handle)
}
