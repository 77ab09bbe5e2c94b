//! Analytics records and camera zones

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use cctv_core::models::{
    AnalyticsQuery, AnalyticsRecord, CameraZone, NewAnalyticsRecord, UpsertZoneRequest,
};

use crate::http::{AppError, AppResult, AppState};

pub fn create_analytics_router() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(list_analytics).post(create_analytics))
        .route("/zones", get(list_zones))
        .route("/zones/{camera_id}", get(get_zone).put(upsert_zone))
}

/// POST /analytics
pub async fn create_analytics(
    State(state): State<AppState>,
    Json(record): Json<NewAnalyticsRecord>,
) -> AppResult<Json<AnalyticsRecord>> {
    let created = state.repositories.analytics.create(&record).await?;
    tracing::debug!(id = created.id, area = %created.area_name, "Analytics record created");
    Ok(Json(created))
}

/// GET /analytics?skip=&limit= - newest first
pub async fn list_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> AppResult<Json<Vec<AnalyticsRecord>>> {
    let records = state.repositories.analytics.list(query.normalized()).await?;
    Ok(Json(records))
}

/// GET /zones
pub async fn list_zones(State(state): State<AppState>) -> AppResult<Json<Vec<CameraZone>>> {
    Ok(Json(state.repositories.zones.list().await?))
}

/// GET /zones/{camera_id}
pub async fn get_zone(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> AppResult<Json<CameraZone>> {
    state
        .repositories
        .zones
        .get(&camera_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Zone not found"))
}

/// PUT /zones/{camera_id}
pub async fn upsert_zone(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Json(request): Json<UpsertZoneRequest>,
) -> AppResult<Json<CameraZone>> {
    let zone = state
        .repositories
        .zones
        .upsert(&camera_id, &request.points)
        .await?;
    tracing::info!(camera_id = %camera_id, points = zone.points.len(), "Zone updated");
    Ok(Json(zone))
}
