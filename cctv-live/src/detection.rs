//! Per-session detection worker
//!
//! Pulls distinct frames from a feed, runs the detector on every Nth one and
//! pushes results through a bounded channel. Results are sent with
//! `try_send`: a slow consumer loses stale results instead of stalling the
//! worker. The final error is sent with `send` so it always arrives.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cctv_core::config::{AnalyticsConfig, CounterMode, DetectionConfig};
use cctv_core::models::{unix_timestamp, CameraDescriptor, DetectionEvent, SessionCounters};

use crate::capture::CaptureState;
use crate::detector::{random_placeholder, Detector};
use crate::hub::FrameFeed;
use crate::protocol::{DetectionResults, SessionStatistics};
use crate::reporter::AnalyticsReporter;

/// Lower bound for the frame wait, so a zero interval never spins
const MIN_FRAME_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct DetectionSettings {
    pub sample_every: u32,
    pub frame_interval: Duration,
    /// Minimum detector score, `0.0..=1.0`
    pub confidence_threshold: f64,
    pub counter_mode: CounterMode,
    pub channel_capacity: usize,
    pub report_interval: Option<Duration>,
}

impl DetectionSettings {
    #[must_use]
    pub fn from_config(detection: &DetectionConfig, analytics: &AnalyticsConfig) -> Self {
        Self {
            sample_every: detection.sample_every.max(1),
            frame_interval: Duration::from_millis(detection.frame_interval_ms),
            confidence_threshold: f64::from(detection.confidence_threshold),
            counter_mode: detection.counter_mode,
            channel_capacity: detection.channel_capacity.max(1),
            report_interval: (analytics.report_interval_seconds > 0)
                .then(|| Duration::from_secs(analytics.report_interval_seconds)),
        }
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default(), &AnalyticsConfig::default())
    }
}

/// What a worker reports to its session
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Results(DetectionResults),
    /// Unrecoverable; always the last event
    Error(String),
}

/// Session's handle on a running worker
pub struct DetectionHandle {
    stats: Arc<Mutex<SessionStatistics>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DetectionHandle {
    #[must_use]
    pub fn statistics(&self) -> SessionStatistics {
        self.stats.lock().clone()
    }

    /// Cancel the worker and wait until it has released its feed
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Detection worker panicked");
        }
    }
}

pub struct DetectionWorker {
    camera: CameraDescriptor,
    feed: FrameFeed,
    detector: Arc<dyn Detector>,
    settings: DetectionSettings,
    reporter: Option<AnalyticsReporter>,
    stats: Arc<Mutex<SessionStatistics>>,
    events: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
}

impl DetectionWorker {
    /// Start a worker for `camera`, returning its handle and event stream
    pub fn spawn(
        camera: CameraDescriptor,
        feed: FrameFeed,
        detector: Arc<dyn Detector>,
        settings: DetectionSettings,
        reporter: Option<AnalyticsReporter>,
    ) -> (DetectionHandle, mpsc::Receiver<WorkerEvent>) {
        let (tx, rx) = mpsc::channel(settings.channel_capacity);
        let cancel = CancellationToken::new();
        let stats = Arc::new(Mutex::new(SessionStatistics {
            detector: detector.name().to_string(),
            is_running: true,
            ..SessionStatistics::default()
        }));

        let worker = Self {
            camera,
            feed,
            detector,
            settings,
            reporter,
            stats: stats.clone(),
            events: tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());

        (
            DetectionHandle {
                stats,
                cancel,
                task,
            },
            rx,
        )
    }

    async fn run(mut self) {
        let camera_id = self.camera.id.clone();
        info!(camera_id = %camera_id, detector = self.detector.name(), "Detection worker started");

        if let Some(message) = self.process().await {
            warn!(camera_id = %camera_id, error = %message, "Detection worker failed");
            // Receiver gone means the session already ended
            let _ = self.events.send(WorkerEvent::Error(message)).await;
        }

        self.stats.lock().is_running = false;
        self.feed.release().await;
        info!(camera_id = %camera_id, "Detection worker stopped");
    }

    /// Main loop; returns the error message that ends the session, if any
    async fn process(&mut self) -> Option<String> {
        let wait = self.settings.frame_interval.max(MIN_FRAME_WAIT);
        let mut counters = SessionCounters::new();
        let mut last_seq = 0;
        let mut distinct: u64 = 0;
        let mut streamed = false;

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                frame = self.feed.cell().next_after(last_seq, wait) => frame,
            };

            let Some(frame) = next else {
                match self.feed.state() {
                    CaptureState::Failed if streamed => {
                        return Some(format!("Lost video stream: {}", self.camera.stream_url));
                    }
                    CaptureState::Failed => {
                        return Some(format!("Failed to open stream: {}", self.camera.stream_url));
                    }
                    CaptureState::Stopped => {
                        return Some("Video stream stopped".to_string());
                    }
                    _ => continue,
                }
            };

            streamed = true;
            last_seq = frame.seq;
            distinct += 1;
            self.stats.lock().frames_seen += 1;

            if distinct % u64::from(self.settings.sample_every) == 0 {
                // Not raced against cancellation: an in-flight detection completes
                let events = match self.detector.detect(frame).await {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(camera_id = %self.camera.id, error = %e, "Detection failed, sending placeholder");
                        self.stats.lock().detector_failures += 1;
                        random_placeholder(unix_timestamp())
                    }
                };
                let events = self.filter(events);

                match self.settings.counter_mode {
                    CounterMode::Latest => counters.replace_with(&events),
                    CounterMode::Cumulative => counters.accumulate(&events),
                }
                {
                    let mut stats = self.stats.lock();
                    stats.frames_sampled += 1;
                    stats.total_detections += events.len() as u64;
                    stats.object_counters = counters.clone();
                }

                let results = DetectionResults {
                    timestamp: unix_timestamp(),
                    total_objects: events.len(),
                    objects: events,
                    counters: counters.clone(),
                };
                match self.events.try_send(WorkerEvent::Results(results)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.stats.lock().dropped_results += 1;
                        debug!(camera_id = %self.camera.id, "Consumer lagging, result dropped");
                    }
                    Err(TrySendError::Closed(_)) => return None,
                }

                if let Some(reporter) = self.reporter.as_mut() {
                    reporter.maybe_report(&counters).await;
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => return None,
                () = tokio::time::sleep(self.settings.frame_interval) => {}
            }
        }
    }

    fn filter(&self, events: Vec<DetectionEvent>) -> Vec<DetectionEvent> {
        let threshold = self.settings.confidence_threshold * 100.0;
        events
            .into_iter()
            .filter(|e| e.confidence >= threshold)
            .collect()
    }
}
