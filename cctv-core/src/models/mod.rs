pub mod analytics;
pub mod camera;
pub mod detection;

pub use analytics::{AnalyticsQuery, AnalyticsRecord, NewAnalyticsRecord};
pub use camera::{CameraDescriptor, CameraZone, UpsertZoneRequest, ZonePoint};
pub use detection::{class_color, unix_timestamp, DetectionEvent, SessionCounters, PALETTE};
