//! Client for an HTTP inference service
//!
//! The frame is posted as `image/jpeg`; the service answers with
//!
//! ```json
//! {"detections": [{"label": "car", "class_id": 2, "confidence": 0.91,
//!                  "bbox": [x1, y1, x2, y2]}]}
//! ```
//!
//! where `confidence` is in `0.0..=1.0` and `bbox` holds corner coordinates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;

use cctv_core::config::DetectionConfig;
use cctv_core::models::{unix_timestamp, DetectionEvent};

use super::Detector;
use crate::error::DetectError;
use crate::frame::Frame;

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    detections: Vec<InferenceDetection>,
}

#[derive(Debug, Deserialize)]
struct InferenceDetection {
    label: String,
    #[serde(default)]
    class_id: u32,
    confidence: f64,
    bbox: [f64; 4],
}

pub struct RemoteDetector {
    client: reqwest::Client,
    endpoint: String,
    jpeg_quality: u8,
}

impl RemoteDetector {
    pub fn new(endpoint: impl Into<String>, config: &DetectionConfig) -> Result<Self, DetectError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            jpeg_quality: config.jpeg_quality,
        })
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    fn name(&self) -> &str {
        "remote"
    }

    async fn detect(&self, frame: Arc<Frame>) -> Result<Vec<DetectionEvent>, DetectError> {
        let quality = self.jpeg_quality;
        let jpeg = tokio::task::spawn_blocking(move || frame.to_jpeg(quality))
            .await
            .map_err(|e| DetectError::Internal(format!("encoder task failed: {e}")))??;

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DetectError::Status(response.status()));
        }

        let body: InferenceResponse = response.json().await?;
        let timestamp = unix_timestamp();
        Ok(body
            .detections
            .into_iter()
            .map(|d| DetectionEvent::from_corners(d.label, d.confidence, d.bbox, d.class_id, timestamp))
            .collect())
    }
}
