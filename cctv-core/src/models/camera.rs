use serde::{Deserialize, Serialize};

/// A point of a camera zone polygon, in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZonePoint {
    pub x: f64,
    pub y: f64,
}

/// One known camera, as listed in the catalog document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "url", alias = "streamUrl")]
    pub stream_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<Vec<ZonePoint>>,
}

impl CameraDescriptor {
    /// Whether the camera can be opened for live detection
    #[must_use]
    pub fn has_stream(&self) -> bool {
        !self.stream_url.trim().is_empty()
    }

    /// Name used when reporting analytics for this camera
    #[must_use]
    pub fn area_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Stored polygon for a camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraZone {
    pub id: i64,
    pub camera_id: String,
    pub points: Vec<ZonePoint>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertZoneRequest {
    pub points: Vec<ZonePoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_accepts_url_alias() {
        let cam: CameraDescriptor = serde_json::from_str(
            r#"{"id":"cam-1","name":"Simpang","url":"https://origin/live/index.m3u8"}"#,
        )
        .unwrap();
        assert_eq!(cam.stream_url, "https://origin/live/index.m3u8");
        assert!(cam.has_stream());
        assert!(cam.zone.is_none());
    }

    #[test]
    fn test_descriptor_without_stream() {
        let cam: CameraDescriptor = serde_json::from_str(r#"{"id":"cam-2"}"#).unwrap();
        assert!(!cam.has_stream());
        assert_eq!(cam.area_name(), "cam-2");

        let json = serde_json::to_value(&cam).unwrap();
        assert!(json.get("zone").is_none());
        assert_eq!(json["stream_url"], "");
    }
}
