//! Camera catalog endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use cctv_core::{catalog::CatalogDocument, models::CameraDescriptor};

use crate::http::{AppError, AppResult, AppState};

pub fn create_cctv_router() -> Router<AppState> {
    Router::new()
        .route("/cctv", get(list_cctv))
        .route("/cctv/{id}", get(get_cctv))
}

/// GET /cctv - all known cameras
pub async fn list_cctv(State(state): State<AppState>) -> Json<CatalogDocument> {
    Json(state.catalog.to_document())
}

/// GET /cctv/{id}
pub async fn get_cctv(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<CameraDescriptor>> {
    state
        .catalog
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found("CCTV not found"))
}
