//! Static camera catalog
//!
//! The catalog is a JSON document of the form `{"devices": [...]}` loaded once
//! at startup. Lookups are by exact camera id.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{models::CameraDescriptor, Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub devices: Vec<CameraDescriptor>,
}

/// Read-only lookup of known cameras
#[derive(Debug, Clone, Default)]
pub struct CameraCatalog {
    devices: Vec<CameraDescriptor>,
}

impl CameraCatalog {
    #[must_use]
    pub fn new(devices: Vec<CameraDescriptor>) -> Self {
        Self { devices }
    }

    /// Parse a catalog document
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Ok(Self::new(doc.devices))
    }

    /// Load the catalog from disk. A missing file yields an empty catalog.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Camera catalog not found, starting with no cameras");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let catalog = Self::from_json(&json).map_err(|e| {
            Error::Config(format!("invalid camera catalog {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), devices = catalog.len(), "Camera catalog loaded");
        Ok(catalog)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CameraDescriptor> {
        self.devices.iter().find(|d| d.id == id)
    }

    #[must_use]
    pub fn list(&self) -> &[CameraDescriptor] {
        &self.devices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The document shape served by the listing endpoint
    #[must_use]
    pub fn to_document(&self) -> CatalogDocument {
        CatalogDocument {
            devices: self.devices.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "devices": [
            {"id": "cam-1", "name": "Simpang Lima", "stream_url": "https://origin/live/index.m3u8"},
            {"id": "cam-2", "name": "Panorama", "streamUrl": "https://origin/p/index.m3u8",
             "zone": [{"x": 0, "y": 0}, {"x": 100, "y": 0}, {"x": 100, "y": 100}]}
        ]
    }"#;

    #[test]
    fn test_lookup_by_id() {
        let catalog = CameraCatalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("cam-1").unwrap().name, "Simpang Lima");
        assert_eq!(catalog.get("cam-2").unwrap().zone.as_ref().unwrap().len(), 3);
        assert!(catalog.get("cam-9").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let catalog = CameraCatalog::from_file(file.path()).unwrap();
        assert_eq!(catalog.list()[1].stream_url, "https://origin/p/index.m3u8");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CameraCatalog::from_file(dir.path().join("cctv.json")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"devices\": [").unwrap();
        assert!(matches!(
            CameraCatalog::from_file(file.path()),
            Err(Error::Config(_))
        ));
    }
}
