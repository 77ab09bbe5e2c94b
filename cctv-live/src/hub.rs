//! Owner of the primary capture and supplier of frame feeds
//!
//! The primary source (if configured) is decoded once for the lifetime of the
//! process and shared by the MJPEG feed and every detection session watching
//! the same camera. Sessions for any other camera get a capture of their own
//! that ends with the session.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use cctv_core::config::CaptureConfig;

use crate::capture::{CaptureHandle, CaptureSettings, CaptureState};
use crate::frame::FrameCell;
use crate::source::SourceFactory;

/// Frames for one consumer, either shared or owned
pub struct FrameFeed {
    url: String,
    cell: Arc<FrameCell>,
    state: watch::Receiver<CaptureState>,
    owned: Option<CaptureHandle>,
}

impl FrameFeed {
    /// Read from a capture owned by someone else
    #[must_use]
    pub fn shared(capture: &CaptureHandle) -> Self {
        Self {
            url: capture.url().to_string(),
            cell: capture.cell().clone(),
            state: capture.subscribe(),
            owned: None,
        }
    }

    /// Take ownership of `capture`; it is stopped on release
    #[must_use]
    pub fn owned(capture: CaptureHandle) -> Self {
        let mut feed = Self::shared(&capture);
        feed.owned = Some(capture);
        feed
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
    pub const fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    /// Stop an owned capture; shared feeds are left running
    pub async fn release(self) {
        if let Some(capture) = self.owned {
            let _ = capture.shutdown().await;
        }
    }
}

pub struct LiveHub {
    primary_url: Option<String>,
    primary: Option<CaptureHandle>,
    factory: Arc<dyn SourceFactory>,
    settings: CaptureSettings,
}

impl LiveHub {
    /// Hub without a primary source
    #[must_use]
    pub fn new(factory: Arc<dyn SourceFactory>, settings: CaptureSettings) -> Self {
        Self {
            primary_url: None,
            primary: None,
            factory,
            settings,
        }
    }

    /// Start the configured primary capture, if any
    #[must_use]
    pub fn start(config: &CaptureConfig, factory: Arc<dyn SourceFactory>) -> Self {
        let hub = Self::new(factory, CaptureSettings::from(config));
        match config.source_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => hub.with_primary(url),
            _ => {
                info!("No primary video source configured");
                hub
            }
        }
    }

    /// Start capturing `url` as the primary source
    #[must_use]
    pub fn with_primary(mut self, url: &str) -> Self {
        info!(url = %url, "Starting primary capture");
        let source = self.factory.source_for(url);
        self.primary = Some(CaptureHandle::spawn(
            source,
            Arc::new(FrameCell::new()),
            self.settings,
        ));
        self.primary_url = Some(url.to_string());
        self
    }

    #[must_use]
    pub fn primary(&self) -> Option<&CaptureHandle> {
        self.primary.as_ref()
    }

    #[must_use]
    pub fn primary_url(&self) -> Option<&str> {
        self.primary_url.as_deref()
    }

    #[must_use]
    pub fn primary_cell(&self) -> Option<Arc<FrameCell>> {
        self.primary.as_ref().map(|p| p.cell().clone())
    }

    /// Frames for `stream_url`
    #[must_use]
    pub fn feed_for(&self, stream_url: &str) -> FrameFeed {
        if let Some(primary) = &self.primary {
            if self.primary_url.as_deref() == Some(stream_url) {
                return FrameFeed::shared(primary);
            }
        }
        let capture = CaptureHandle::spawn(
            self.factory.source_for(stream_url),
            Arc::new(FrameCell::new()),
            self.settings,
        );
        FrameFeed::owned(capture)
    }

    pub async fn shutdown(&self) {
        if let Some(primary) = &self.primary {
            if let Err(e) = primary.shutdown().await {
                info!(error = %e, "Primary capture ended with error");
            }
        }
    }
}
