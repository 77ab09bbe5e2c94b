#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;
use http_body_util::BodyExt;

use cctv_api::AppState;
use cctv_core::models::CameraDescriptor;
use cctv_core::repository::Repositories;
use cctv_core::{CameraCatalog, Config};
use cctv_live::testing::{ScriptedFactory, ScriptedSource, StaticDetector};
use cctv_live::{Detector, LiveHub};

pub fn camera(id: &str, name: &str, stream_url: &str) -> CameraDescriptor {
    CameraDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        stream_url: stream_url.to_string(),
        location: None,
        zone: None,
    }
}

pub fn catalog() -> CameraCatalog {
    CameraCatalog::new(vec![
        camera("cam-1", "Simpang Lima", "rtsp://cam/1"),
        camera("cam-2", "Tugu Muda", "https://origin/cam2/index.m3u8"),
        camera("cam-3", "Offline", ""),
    ])
}

pub struct TestApp {
    pub state: AppState,
    pub factory: Arc<ScriptedFactory>,
}

/// State with in-memory repositories and a scripted video source
pub fn test_app(config: Config, source: ScriptedSource) -> TestApp {
    let factory = Arc::new(ScriptedFactory::new(source));
    let hub = LiveHub::start(&config.capture, factory.clone());
    let detector: Arc<dyn Detector> = Arc::new(StaticDetector::new(&[("car", 1, 0.9)]));

    let state = AppState::new(
        Arc::new(config),
        Arc::new(catalog()),
        Repositories::in_memory(),
        Arc::new(hub),
        detector,
    )
    .unwrap();

    TestApp { state, factory }
}

pub fn default_app() -> TestApp {
    test_app(Config::default(), ScriptedSource::new("scripted"))
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
