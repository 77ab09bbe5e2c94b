//! Live video: capture, frame sharing, MJPEG relay and detection sessions

pub mod capture;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod hub;
pub mod mjpeg;
pub mod protocol;
pub mod reporter;
pub mod source;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use capture::{CaptureHandle, CaptureSettings, CaptureState};
pub use detection::{DetectionHandle, DetectionSettings, DetectionWorker, WorkerEvent};
pub use detector::{build_detector, Detector, MockDetector, RemoteDetector};
pub use error::{CaptureError, DetectError};
pub use frame::{Frame, FrameCell};
pub use hub::{FrameFeed, LiveHub};
pub use mjpeg::{mjpeg_stream, MjpegSettings};
pub use protocol::{ClientMessage, DetectionResults, ServerMessage, SessionStatistics};
pub use reporter::AnalyticsReporter;
pub use source::{FfmpegSource, FfmpegSourceFactory, SourceFactory, VideoSource};
