//! Object detection backends

mod mock;
mod remote;

pub use mock::{placeholder_detections, random_placeholder, MockDetector};
pub use remote::RemoteDetector;

use std::sync::Arc;

use async_trait::async_trait;

use cctv_core::config::{DetectionConfig, DetectorBackend};
use cctv_core::models::DetectionEvent;

use crate::error::DetectError;
use crate::frame::Frame;

/// Finds labeled objects in a frame
#[async_trait]
pub trait Detector: Send + Sync {
    /// Short backend name reported in session statistics
    fn name(&self) -> &str;

    async fn detect(&self, frame: Arc<Frame>) -> Result<Vec<DetectionEvent>, DetectError>;
}

/// Build the detector selected by configuration
pub fn build_detector(config: &DetectionConfig) -> Result<Arc<dyn Detector>, DetectError> {
    match config.backend {
        DetectorBackend::Mock => Ok(Arc::new(MockDetector::new())),
        DetectorBackend::Remote => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                DetectError::Config("detection.endpoint is required for the remote backend".to_string())
            })?;
            Ok(Arc::new(RemoteDetector::new(endpoint, config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_detector_by_backend() {
        let mock = build_detector(&DetectionConfig::default()).unwrap();
        assert_eq!(mock.name(), "mock");

        let missing = DetectionConfig {
            backend: DetectorBackend::Remote,
            ..DetectionConfig::default()
        };
        assert!(matches!(build_detector(&missing), Err(DetectError::Config(_))));

        let remote = DetectionConfig {
            backend: DetectorBackend::Remote,
            endpoint: Some("http://127.0.0.1:9000/detect".to_string()),
            ..DetectionConfig::default()
        };
        assert_eq!(build_detector(&remote).unwrap().name(), "remote");
    }
}
