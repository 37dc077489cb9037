//! REST API module for external consumers
//!
//! Provides read-only HTTP endpoints for the node's time-sync status and
//! startup configuration.

mod dto;
mod handlers;
mod server;

pub use dto::ErrorResponse;
pub use handlers::ApiState;
pub use server::{
    bind_with_retry, router, run_server, spawn_server_thread, API_PREFIX, BIND_RETRY_INTERVAL,
    DEFAULT_PORT,
};
