//! MJPEG feed of the primary camera

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
};

use cctv_live::mjpeg::{self, mjpeg_stream};

use crate::http::{AppError, AppResult, AppState};

/// GET /video_feed
pub async fn video_feed(State(state): State<AppState>) -> AppResult<Response> {
    let primary = state
        .hub
        .primary()
        .ok_or_else(|| AppError::service_unavailable("No video source configured"))?;
    let frames = mjpeg_stream(primary.cell().clone(), primary.subscribe(), state.mjpeg);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mjpeg::CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(frames))
        .map_err(|e| AppError::internal_server_error(format!("Failed to build response: {e}")))
}
