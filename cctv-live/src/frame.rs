//! Single-slot frame buffer shared between a capture worker and its consumers

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// One decoded frame
#[derive(Debug)]
pub struct Frame {
    /// Strictly increasing per cell, starting at 1
    pub seq: u64,
    pub captured_at: Instant,
    pub image: RgbImage,
}

impl Frame {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode as a baseline JPEG
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        encode_jpeg(&self.image, quality)
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buf)
}

#[derive(Default)]
struct Slot {
    latest: Option<Arc<Frame>>,
    last_seq: u64,
}

/// Holds the most recently published frame.
///
/// Readers clone the `Arc` under the lock and never observe a frame being
/// written. Waiting readers are woken on every publish.
#[derive(Default)]
pub struct FrameCell {
    slot: Mutex<Slot>,
    notify: Notify,
}

impl FrameCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame, returning its sequence number
    pub fn publish(&self, image: RgbImage) -> u64 {
        let seq = {
            let mut slot = self.slot.lock();
            slot.last_seq += 1;
            let seq = slot.last_seq;
            slot.latest = Some(Arc::new(Frame {
                seq,
                captured_at: Instant::now(),
                image,
            }));
            seq
        };
        self.notify.notify_waiters();
        seq
    }

    #[must_use]
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.slot.lock().latest.clone()
    }

    fn newer_than(&self, seq: u64) -> Option<Arc<Frame>> {
        self.slot
            .lock()
            .latest
            .as_ref()
            .filter(|frame| frame.seq > seq)
            .cloned()
    }

    /// Wait up to `idle` for a frame newer than `seq`.
    ///
    /// `None` means nothing new arrived yet and the caller should poll again.
    pub async fn next_after(&self, seq: u64, idle: Duration) -> Option<Arc<Frame>> {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a publish in between is not missed
        notified.as_mut().enable();

        if let Some(frame) = self.newer_than(seq) {
            return Some(frame);
        }
        let _ = tokio::time::timeout(idle, notified).await;
        self.newer_than(seq)
    }

    /// Drop the current frame; sequence numbers keep increasing
    pub fn clear(&self) {
        self.slot.lock().latest = None;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.lock().latest.is_none()
    }

    /// Sequence number of the last published frame, 0 if none
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.slot.lock().last_seq
    }
}
