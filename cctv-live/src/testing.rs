//! Scripted sources and detectors for tests

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use parking_lot::Mutex;

use cctv_core::models::{unix_timestamp, DetectionEvent};

use crate::detector::Detector;
use crate::error::{CaptureError, DetectError};
use crate::frame::Frame;
use crate::source::{FrameReader, SourceFactory, VideoSource};

/// Uniform test image whose pixels all carry `value`
#[must_use]
pub fn solid_image(value: u8) -> RgbImage {
    RgbImage::from_pixel(32, 24, Rgb([value, value, value]))
}

/// A source whose behavior is fixed up front
pub struct ScriptedSource {
    name: String,
    /// Opens that succeed before every further open fails; `None` = all succeed
    successful_opens: Option<usize>,
    /// Every Nth read of a handle fails
    fail_every: Option<u64>,
    frame_delay: Duration,
    opens: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            successful_opens: None,
            fail_every: None,
            frame_delay: Duration::from_millis(1),
            opens: AtomicUsize::new(0),
        }
    }

    /// A source that never opens
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self::new(name).with_successful_opens(0)
    }

    #[must_use]
    pub fn with_successful_opens(mut self, opens: usize) -> Self {
        self.successful_opens = Some(opens);
        self
    }

    #[must_use]
    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n);
        self
    }

    #[must_use]
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Number of `open` calls so far
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoSource for ScriptedSource {
    async fn open(&self) -> Result<Box<dyn FrameReader>, CaptureError> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst);
        if self.successful_opens.is_some_and(|allowed| attempt >= allowed) {
            return Err(CaptureError::SourceUnavailable(self.name.clone()));
        }
        Ok(Box::new(ScriptedReader {
            reads: 0,
            fail_every: self.fail_every,
            frame_delay: self.frame_delay,
        }))
    }

    fn describe(&self) -> &str {
        &self.name
    }
}

struct ScriptedReader {
    reads: u64,
    fail_every: Option<u64>,
    frame_delay: Duration,
}

#[async_trait]
impl FrameReader for ScriptedReader {
    async fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        tokio::time::sleep(self.frame_delay).await;
        self.reads += 1;
        if self.fail_every.is_some_and(|n| self.reads % n == 0) {
            return Err(CaptureError::DecodeGlitch(format!("read {}", self.reads)));
        }
        Ok(solid_image((self.reads % 251) as u8))
    }
}

/// Hands out the same scripted source for every URL and records the URLs
pub struct ScriptedFactory {
    source: Arc<ScriptedSource>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedFactory {
    #[must_use]
    pub fn new(source: ScriptedSource) -> Self {
        Self {
            source: Arc::new(source),
            requested: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn source(&self) -> &Arc<ScriptedSource> {
        &self.source
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

impl SourceFactory for ScriptedFactory {
    fn source_for(&self, url: &str) -> Arc<dyn VideoSource> {
        self.requested.lock().push(url.to_string());
        self.source.clone()
    }
}

/// Detector returning fixed labels, optionally failing every call
pub struct StaticDetector {
    labels: Vec<(String, u32, f64)>,
    fail: bool,
    calls: AtomicU64,
}

impl StaticDetector {
    /// Returns one event per `(label, class_id, score)`
    pub fn new(labels: &[(&str, u32, f64)]) -> Self {
        Self {
            labels: labels
                .iter()
                .map(|(label, class_id, score)| ((*label).to_string(), *class_id, *score))
                .collect(),
            fail: false,
            calls: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for StaticDetector {
    fn name(&self) -> &str {
        "static"
    }

    async fn detect(&self, _frame: Arc<Frame>) -> Result<Vec<DetectionEvent>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DetectError::Internal("scripted failure".to_string()));
        }
        let now = unix_timestamp();
        Ok(self
            .labels
            .iter()
            .map(|(label, class_id, score)| {
                DetectionEvent::new(label.clone(), *score, [0.0, 0.0, 10.0, 10.0], *class_id, now)
            })
            .collect())
    }
}
