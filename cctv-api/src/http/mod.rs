// Module: http
// REST endpoints, the HLS proxy, the MJPEG feed and the detection WebSocket

pub mod analytics;
pub mod cctv;
pub mod error;
pub mod health;
pub mod proxy;
pub mod video_feed;
pub mod websocket;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cctv_core::{repository::Repositories, CameraCatalog, Config};
use cctv_live::{DetectionSettings, Detector, LiveHub, MjpegSettings};
use cctv_proxy::{FetchError, MediaProxy};

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<CameraCatalog>,
    pub repositories: Repositories,
    pub proxy: MediaProxy,
    pub hub: Arc<LiveHub>,
    pub detector: Arc<dyn Detector>,
    pub detection: DetectionSettings,
    pub mjpeg: MjpegSettings,
    pub heartbeat: Duration,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<CameraCatalog>,
        repositories: Repositories,
        hub: Arc<LiveHub>,
        detector: Arc<dyn Detector>,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            proxy: MediaProxy::new(&config.proxy)?,
            detection: DetectionSettings::from_config(&config.detection, &config.analytics),
            mjpeg: MjpegSettings::from(&config.mjpeg),
            heartbeat: Duration::from_secs(config.detection.heartbeat_seconds.max(1)),
            config,
            catalog,
            repositories,
            hub,
            detector,
        })
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors.allowed_origins);

    Router::new()
        // Health check endpoints (for monitoring probes)
        .merge(health::create_health_router())
        // Camera catalog
        .merge(cctv::create_cctv_router())
        // Analytics and zones
        .merge(analytics::create_analytics_router())
        // HLS proxy
        .merge(proxy::create_proxy_router())
        // Primary camera MJPEG feed
        .route("/video_feed", get(video_feed::video_feed))
        // WebSocket endpoint for live detection
        .route("/ws/detection/{cctv_id}", get(websocket::websocket_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // Apply state to all routes (must be last)
        .with_state(state)
}

/// `"*"` anywhere in the list allows every origin
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}
