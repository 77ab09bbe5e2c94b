//! Messages of the live detection session

use serde::{Deserialize, Serialize};

use cctv_core::models::{CameraDescriptor, DetectionEvent, SessionCounters};

/// One sampled frame's results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResults {
    pub timestamp: f64,
    pub objects: Vec<DetectionEvent>,
    pub counters: SessionCounters,
    pub total_objects: usize,
}

/// Worker counters reported on request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub detector: String,
    pub is_running: bool,
    pub frames_seen: u64,
    pub frames_sampled: u64,
    pub total_detections: u64,
    pub detector_failures: u64,
    pub dropped_results: u64,
    pub object_counters: SessionCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ping,
    Pong,
    CctvInfo { data: CameraDescriptor },
    DetectionResults(DetectionResults),
    Statistics(SessionStatistics),
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Stop,
    GetStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_messages_are_type_tagged() {
        assert_eq!(ServerMessage::Ping.to_json().unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(
            serde_json::to_value(ServerMessage::error("CCTV not found")).unwrap(),
            json!({"type": "error", "message": "CCTV not found"})
        );
    }

    #[test]
    fn test_detection_results_shape() {
        let objects = vec![DetectionEvent::new("car", 0.9, [1.0, 2.0, 3.0, 4.0], 1, 100.0)];
        let msg = ServerMessage::DetectionResults(DetectionResults {
            timestamp: 100.5,
            counters: SessionCounters::tally(&objects),
            total_objects: objects.len(),
            objects,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "detection_results");
        assert_eq!(value["timestamp"], 100.5);
        assert_eq!(value["total_objects"], 1);
        assert_eq!(value["counters"], json!({"car": 1}));
        assert_eq!(value["objects"][0]["label"], "car");
        assert_eq!(value["objects"][0]["color"], "#00FF00");
    }

    #[test]
    fn test_cctv_info_wraps_descriptor() {
        let camera: CameraDescriptor =
            serde_json::from_value(json!({"id": "cam-1", "name": "Gate", "stream_url": "https://o/i.m3u8"}))
                .unwrap();
        let value = serde_json::to_value(ServerMessage::CctvInfo { data: camera }).unwrap();
        assert_eq!(value["type"], "cctv_info");
        assert_eq!(value["data"]["id"], "cam-1");
    }

    #[test]
    fn test_client_messages_parse() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"stop"}"#).unwrap(),
            ClientMessage::Stop
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"get_statistics"}"#).unwrap(),
            ClientMessage::GetStatistics
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"dance"}"#).is_err());
    }
}
