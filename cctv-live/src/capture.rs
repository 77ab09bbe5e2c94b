//! Capture worker: reads a video source and publishes into a frame cell
//!
//! State machine:
//!
//! ```text
//! Stopped -> Opening -> Streaming <-> Reconnecting
//!               |            |             |
//!             Failed      Stopped        Failed
//! ```
//!
//! A source that cannot be opened at all is a permanent failure. Read
//! failures while streaming reconnect with exponential backoff; every failed
//! reopen clears the cell so consumers never see a stale frame for longer
//! than one reconnect cycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use cctv_core::config::CaptureConfig;

use crate::error::CaptureError;
use crate::frame::FrameCell;
use crate::source::{FrameReader, VideoSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Stopped,
    Opening,
    Streaming,
    Reconnecting,
    Failed,
}

impl CaptureState {
    /// No more frames will be published
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

/// Reconnect policy
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// 0 = unlimited
    pub max_reconnect_attempts: u32,
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.reconnect_initial_backoff_ms),
            max_backoff: Duration::from_millis(config.reconnect_max_backoff_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

struct CaptureWorker {
    source: Arc<dyn VideoSource>,
    cell: Arc<FrameCell>,
    settings: CaptureSettings,
    state: watch::Sender<CaptureState>,
    cancel: CancellationToken,
}

impl CaptureWorker {
    fn set_state(&self, state: CaptureState) {
        self.state.send_replace(state);
    }

    async fn run(self) -> Result<(), CaptureError> {
        let url = self.source.describe().to_string();
        self.set_state(CaptureState::Opening);

        let opened = tokio::select! {
            () = self.cancel.cancelled() => {
                self.set_state(CaptureState::Stopped);
                return Ok(());
            }
            opened = self.source.open() => opened,
        };
        let mut reader = match opened {
            Ok(reader) => reader,
            Err(e) => {
                error!(url = %url, error = %e, "Failed to open video source");
                self.set_state(CaptureState::Failed);
                return Err(e);
            }
        };

        info!(url = %url, "Capture streaming");
        self.set_state(CaptureState::Streaming);

        loop {
            let read = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                read = reader.read_frame() => read,
            };

            match read {
                Ok(image) => {
                    let seq = self.cell.publish(image);
                    trace!(url = %url, seq, "Frame published");
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Frame read failed, reconnecting");
                    drop(reader);
                    self.set_state(CaptureState::Reconnecting);
                    match self.reconnect(&url).await? {
                        Some(reopened) => {
                            reader = reopened;
                            self.set_state(CaptureState::Streaming);
                        }
                        None => break,
                    }
                }
            }
        }

        info!(url = %url, "Capture stopped");
        self.set_state(CaptureState::Stopped);
        Ok(())
    }

    /// Reopen the source. `Ok(None)` means the worker was cancelled.
    async fn reconnect(&self, url: &str) -> Result<Option<Box<dyn FrameReader>>, CaptureError> {
        let mut backoff = self.settings.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let opened = tokio::select! {
                () = self.cancel.cancelled() => return Ok(None),
                opened = self.source.open() => opened,
            };

            match opened {
                Ok(reader) => {
                    info!(url = %url, attempt, "Video source reconnected");
                    return Ok(Some(reader));
                }
                Err(e) => {
                    self.cell.clear();
                    warn!(url = %url, attempt, error = %e, "Reconnect attempt failed");

                    let limit = self.settings.max_reconnect_attempts;
                    if limit != 0 && attempt >= limit {
                        error!(url = %url, attempts = attempt, "Giving up on video source");
                        self.set_state(CaptureState::Failed);
                        return Err(CaptureError::ReconnectExhausted { attempts: attempt });
                    }

                    tokio::select! {
                        () = self.cancel.cancelled() => return Ok(None),
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.settings.max_backoff);
                }
            }
        }
    }
}

/// Owner's view of a running capture worker
pub struct CaptureHandle {
    url: String,
    cell: Arc<FrameCell>,
    state: watch::Receiver<CaptureState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<(), CaptureError>>>>,
}

impl CaptureHandle {
    /// Start a worker publishing `source` into `cell`
    #[must_use]
    pub fn spawn(
        source: Arc<dyn VideoSource>,
        cell: Arc<FrameCell>,
        settings: CaptureSettings,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(CaptureState::Opening);
        let cancel = CancellationToken::new();
        let url = source.describe().to_string();

        let worker = CaptureWorker {
            source,
            cell: cell.clone(),
            settings,
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());

        Self {
            url,
            cell,
            state: state_rx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub const fn cell(&self) -> &Arc<FrameCell> {
        &self.cell
    }

    #[must_use]
    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.clone()
    }

    /// Ask the worker to stop without waiting for it
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the worker and wait for it. Later calls return `Ok(())`.
    pub async fn shutdown(&self) -> Result<(), CaptureError> {
        self.stop();
        let task = self.task.lock().take();
        match task {
            Some(task) => task.await.unwrap_or_else(|e| {
                error!(url = %self.url, error = %e, "Capture task panicked");
                Ok(())
            }),
            None => Ok(()),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;

    fn fast_settings(max_reconnect_attempts: u32) -> CaptureSettings {
        CaptureSettings {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_reconnect_attempts,
        }
    }

    async fn wait_for(handle: &CaptureHandle, wanted: CaptureState) {
        let mut rx = handle.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached")
            .unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_source_fails_once() {
        let source = Arc::new(ScriptedSource::unavailable("rtsp://cam/down"));
        let cell = Arc::new(FrameCell::new());
        let handle = CaptureHandle::spawn(source.clone(), cell.clone(), fast_settings(0));

        wait_for(&handle, CaptureState::Failed).await;
        let result = handle.shutdown().await;
        assert!(matches!(result, Err(CaptureError::SourceUnavailable(_))));
        assert_eq!(source.opens(), 1);
        assert!(cell.is_empty());
    }

    #[tokio::test]
    async fn test_glitching_source_keeps_publishing() {
        // Every third read fails; the worker must reconnect and carry on
        let source = Arc::new(ScriptedSource::new("rtsp://cam/flaky").failing_every(3));
        let cell = Arc::new(FrameCell::new());
        let handle = CaptureHandle::spawn(source.clone(), cell.clone(), fast_settings(0));

        let mut seen = 0;
        let mut last = 0;
        while seen < 20 {
            let frame = cell
                .next_after(last, Duration::from_secs(2))
                .await
                .expect("capture stopped publishing");
            assert!(frame.seq > last);
            last = frame.seq;
            seen += 1;
            assert_ne!(handle.state(), CaptureState::Failed);
        }
        assert!(source.opens() > 5);

        handle.shutdown().await.unwrap();
        assert_eq!(handle.state(), CaptureState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_reconnect_clears_stale_frame() {
        // One good open, a glitch on the third read, then the source is gone
        let source = Arc::new(
            ScriptedSource::new("rtsp://cam/lost")
                .with_successful_opens(1)
                .failing_every(3),
        );
        let cell = Arc::new(FrameCell::new());
        let handle = CaptureHandle::spawn(source.clone(), cell.clone(), fast_settings(3));

        wait_for(&handle, CaptureState::Failed).await;
        assert!(cell.is_empty());
        assert_eq!(cell.last_seq(), 2);

        let result = handle.shutdown().await;
        assert!(matches!(
            result,
            Err(CaptureError::ReconnectExhausted { attempts: 3 })
        ));
        assert_eq!(source.opens(), 4);
    }

    #[tokio::test]
    async fn test_stop_while_streaming() {
        let source = Arc::new(ScriptedSource::new("file:///clip.mp4"));
        let cell = Arc::new(FrameCell::new());
        let handle = CaptureHandle::spawn(source, cell.clone(), fast_settings(0));

        wait_for(&handle, CaptureState::Streaming).await;
        assert!(cell.next_after(0, Duration::from_secs(2)).await.is_some());

        handle.shutdown().await.unwrap();
        assert_eq!(handle.state(), CaptureState::Stopped);
        assert!(handle.shutdown().await.is_ok());
    }
}
