//! Live detection session
//!
//! Runs the session protocol over any [`SessionStream`]. The WebSocket
//! handler adapts a socket to this trait; tests drive it with channels.
//!
//! Order of server messages: `ping`, then either a single `error` (unknown
//! camera) or `cctv_info` followed by `detection_results` until the session
//! ends. Heartbeat `ping`s and replies to client requests are interleaved.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use cctv_core::models::CameraDescriptor;
use cctv_core::repository::{AnalyticsRepository, ZoneRepository};
use cctv_core::CameraCatalog;
use cctv_live::{
    AnalyticsReporter, ClientMessage, DetectionHandle, DetectionSettings, DetectionWorker,
    Detector, LiveHub, ServerMessage, WorkerEvent,
};

use crate::http::AppState;

/// Bidirectional message transport for one session
#[async_trait]
pub trait SessionStream: Send {
    /// Next client message. `None` when the client is gone; `Some(Err)` for
    /// input that could not be parsed.
    async fn recv(&mut self) -> Option<Result<ClientMessage, String>>;

    async fn send(&mut self, message: ServerMessage) -> Result<(), String>;
}

enum Step {
    Client(Option<Result<ClientMessage, String>>),
    Worker(Option<WorkerEvent>),
    Heartbeat,
}

pub struct DetectionSession {
    camera_id: String,
    catalog: Arc<CameraCatalog>,
    zones: Arc<dyn ZoneRepository>,
    analytics: Arc<dyn AnalyticsRepository>,
    hub: Arc<LiveHub>,
    detector: Arc<dyn Detector>,
    settings: DetectionSettings,
    heartbeat: Duration,
}

impl DetectionSession {
    #[must_use]
    pub fn new(state: &AppState, camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            catalog: state.catalog.clone(),
            zones: state.repositories.zones.clone(),
            analytics: state.repositories.analytics.clone(),
            hub: state.hub.clone(),
            detector: state.detector.clone(),
            settings: state.detection,
            heartbeat: state.heartbeat,
        }
    }

    pub async fn run<S: SessionStream>(self, stream: &mut S) {
        if stream.send(ServerMessage::Ping).await.is_err() {
            return;
        }

        let camera = match self.resolve_camera().await {
            Ok(camera) => camera,
            Err(message) => {
                info!(camera_id = %self.camera_id, error = %message, "Rejecting detection session");
                let _ = stream.send(ServerMessage::error(message)).await;
                return;
            }
        };

        if stream
            .send(ServerMessage::CctvInfo {
                data: camera.clone(),
            })
            .await
            .is_err()
        {
            return;
        }

        let (handle, events) = self.start_worker(camera);
        self.relay(stream, &handle, events).await;
        handle.stop().await;
        info!(camera_id = %self.camera_id, "Detection session closed");
    }

    /// Catalog entry with the stored zone overlaid
    async fn resolve_camera(&self) -> Result<CameraDescriptor, String> {
        let mut camera = self
            .catalog
            .get(&self.camera_id)
            .cloned()
            .ok_or_else(|| "CCTV not found".to_string())?;
        if !camera.has_stream() {
            return Err("CCTV has no stream URL".to_string());
        }

        match self.zones.get(&camera.id).await {
            Ok(Some(zone)) if zone.is_active && !zone.points.is_empty() => {
                camera.zone = Some(zone.points);
            }
            Ok(_) => {}
            Err(e) => warn!(camera_id = %camera.id, error = %e, "Failed to load zone"),
        }
        Ok(camera)
    }

    fn start_worker(
        &self,
        camera: CameraDescriptor,
    ) -> (DetectionHandle, mpsc::Receiver<WorkerEvent>) {
        let feed = self.hub.feed_for(&camera.stream_url);
        let reporter = self.settings.report_interval.map(|interval| {
            AnalyticsReporter::new(self.analytics.clone(), camera.area_name(), interval)
        });
        info!(
            camera_id = %camera.id,
            shared = !feed.is_owned(),
            "Starting detection session"
        );
        DetectionWorker::spawn(
            camera,
            feed,
            self.detector.clone(),
            self.settings,
            reporter,
        )
    }

    async fn relay<S: SessionStream>(
        &self,
        stream: &mut S,
        handle: &DetectionHandle,
        mut events: mpsc::Receiver<WorkerEvent>,
    ) {
        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                message = stream.recv() => Step::Client(message),
                event = events.recv() => Step::Worker(event),
                _ = heartbeat.tick() => Step::Heartbeat,
            };

            let reply = match step {
                Step::Client(None | Some(Ok(ClientMessage::Stop))) => break,
                Step::Client(Some(Ok(ClientMessage::Ping))) => ServerMessage::Pong,
                Step::Client(Some(Ok(ClientMessage::GetStatistics))) => {
                    ServerMessage::Statistics(handle.statistics())
                }
                Step::Client(Some(Err(e))) => {
                    debug!(camera_id = %self.camera_id, error = %e, "Ignoring client message");
                    continue;
                }
                Step::Worker(Some(WorkerEvent::Results(results))) => {
                    ServerMessage::DetectionResults(results)
                }
                Step::Worker(Some(WorkerEvent::Error(message))) => {
                    let _ = stream.send(ServerMessage::error(message)).await;
                    break;
                }
                Step::Worker(None) => break,
                Step::Heartbeat => ServerMessage::Ping,
            };

            if stream.send(reply).await.is_err() {
                break;
            }
        }
    }
}

