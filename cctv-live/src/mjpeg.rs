//! Multipart JPEG relay of a frame cell

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use tokio::sync::watch;
use tracing::{debug, warn};

use cctv_core::config::MjpegConfig;

use crate::capture::CaptureState;
use crate::frame::FrameCell;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Debug, Clone, Copy)]
pub struct MjpegSettings {
    pub jpeg_quality: u8,
    /// Wait per poll while no new frame is available
    pub idle: Duration,
}

impl From<&MjpegConfig> for MjpegSettings {
    fn from(config: &MjpegConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            idle: Duration::from_millis(config.idle_ms.max(1)),
        }
    }
}

/// One multipart part wrapping `jpeg`
#[must_use]
pub fn part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut buf = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Stream of parts, one per newly published frame
///
/// Ends once the capture behind `cell` is stopped or failed and its last frame
/// has been sent.
pub fn mjpeg_stream(
    cell: Arc<FrameCell>,
    state: watch::Receiver<CaptureState>,
    settings: MjpegSettings,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    futures::stream::unfold((cell, state, 0u64), move |(cell, state, mut last_seq)| async move {
        loop {
            let Some(frame) = cell.next_after(last_seq, settings.idle).await else {
                let current = *state.borrow();
                if current.is_terminal() {
                    debug!(state = ?current, "Capture ended, closing MJPEG stream");
                    return None;
                }
                continue;
            };
            last_seq = frame.seq;

            // Encoding happens on the Arc, outside the cell's lock
            let quality = settings.jpeg_quality;
            match tokio::task::spawn_blocking(move || frame.to_jpeg(quality)).await {
                Ok(Ok(jpeg)) => return Some((Ok(part(&jpeg)), (cell, state, last_seq))),
                Ok(Err(e)) => warn!(seq = last_seq, error = %e, "Failed to encode MJPEG frame"),
                Err(e) => {
                    warn!(error = %e, "MJPEG encoder task failed");
                    return None;
                }
            }
        }
    })
}
