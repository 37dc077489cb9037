//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::config::ConfigDocument;
use crate::controller::metrics;
use crate::status::{StatusStore, Synced};

use super::dto::ErrorResponse;

/// State shared by all handlers
pub struct ApiState {
    pub store: Arc<StatusStore>,
    pub config: Option<Arc<ConfigDocument>>,
}

impl ApiState {
    pub fn new(store: Arc<StatusStore>, config: Option<Arc<ConfigDocument>>) -> Self {
        Self { store, config }
    }
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<Arc<ApiState>>) -> Response {
    let snapshot = state.store.get();
    if snapshot.is_empty() {
        debug!("Status requested before first update");
        return ErrorResponse::internal(None).into_response();
    }
    Json(snapshot).into_response()
}

/// GET /api/v1/status/synced
pub async fn get_synced(State(state): State<Arc<ApiState>>) -> Response {
    match state.store.synced() {
        Synced::True => StatusCode::OK.into_response(),
        Synced::False | Synced::Unknown => {
            ErrorResponse::internal(Some("not synced")).into_response()
        }
    }
}

/// GET /api/v1/config
pub async fn get_config(State(state): State<Arc<ApiState>>) -> Response {
    match &state.config {
        Some(config) if !config.is_empty() => Json(config.as_ref().clone()).into_response(),
        _ => ErrorResponse::internal(None).into_response(),
    }
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /metrics
pub async fn metrics_handler() -> Response {
    use prometheus_client::encoding::text::encode;

    let mut buffer = String::new();
    match encode(&mut buffer, &metrics::REGISTRY) {
        Ok(()) => buffer.into_response(),
        Err(e) => ErrorResponse::internal(Some(&e.to_string())).into_response(),
    }
}
