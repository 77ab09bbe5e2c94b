//! Health check endpoints

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::http::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
}

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}

/// Service banner
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "CCTV Relay API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Basic health check (always returns OK if server is running)
pub async fn health_check() -> impl IntoResponse {
    "OK"
}
