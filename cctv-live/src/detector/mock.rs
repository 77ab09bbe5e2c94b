use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use cctv_core::models::{unix_timestamp, DetectionEvent};

use super::Detector;
use crate::error::DetectError;
use crate::frame::Frame;

/// Chance that the placeholder result also contains a truck
const TRUCK_PROBABILITY: f64 = 0.3;

/// Synthetic detections used when no model is available or a detection fails
#[must_use]
pub fn placeholder_detections(timestamp: f64, with_truck: bool) -> Vec<DetectionEvent> {
    let mut events = vec![
        DetectionEvent::new("person", 0.85, [100.0, 100.0, 50.0, 150.0], 0, timestamp),
        DetectionEvent::new("car", 0.92, [300.0, 200.0, 120.0, 80.0], 1, timestamp),
    ];
    if with_truck {
        events.push(DetectionEvent::new(
            "truck",
            0.78,
            [500.0, 150.0, 150.0, 100.0],
            2,
            timestamp,
        ));
    }
    events
}

/// Placeholder result with the occasional truck
#[must_use]
pub fn random_placeholder(timestamp: f64) -> Vec<DetectionEvent> {
    let with_truck = rand::thread_rng().gen_bool(TRUCK_PROBABILITY);
    placeholder_detections(timestamp, with_truck)
}

/// Detector that reports placeholder objects for every frame
#[derive(Debug, Default)]
pub struct MockDetector;

impl MockDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Detector for MockDetector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn detect(&self, _frame: Arc<Frame>) -> Result<Vec<DetectionEvent>, DetectError> {
        Ok(random_placeholder(unix_timestamp()))
    }
}
