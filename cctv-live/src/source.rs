//! Video sources a capture worker reads frames from
//!
//! The production source runs `ffmpeg`, which understands every origin a
//! camera is likely to expose (HLS, RTSP, HTTP MJPEG, files), and has it
//! write a stream of JPEG images to its stdout. Frames are cut out of the
//! pipe on JPEG markers and decoded on the blocking pool.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use cctv_core::config::CaptureConfig;

use crate::error::CaptureError;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const READ_CHUNK: usize = 64 * 1024;
const MAX_JPEG_BYTES: usize = 16 * 1024 * 1024;

/// An open source handle producing decoded frames
#[async_trait]
pub trait FrameReader: Send {
    /// Next frame. Any error means the handle is unusable.
    async fn read_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Open a fresh handle, failing with `SourceUnavailable`
    async fn open(&self) -> Result<Box<dyn FrameReader>, CaptureError>;

    /// Where the frames come from, for logs
    fn describe(&self) -> &str;
}

/// Creates sources for camera stream URLs
pub trait SourceFactory: Send + Sync {
    fn source_for(&self, url: &str) -> Arc<dyn VideoSource>;
}

/// Cuts complete JPEG images out of a byte stream
#[derive(Debug)]
pub struct JpegSplitter {
    buf: Vec<u8>,
    max_len: usize,
}

impl Default for JpegSplitter {
    fn default() -> Self {
        Self::new(MAX_JPEG_BYTES)
    }
}

impl JpegSplitter {
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// The next complete image, if one has been buffered
    pub fn next_image(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find_marker(&self.buf, SOI, 0) else {
            // Keep a trailing 0xFF, it may begin a marker
            let keep = usize::from(self.buf.last() == Some(&0xFF));
            let cut = self.buf.len() - keep;
            self.buf.drain(..cut);
            return None;
        };
        if start > 0 {
            self.buf.drain(..start);
        }

        match find_marker(&self.buf, EOI, SOI.len()) {
            Some(end) => {
                let image: Vec<u8> = self.buf.drain(..end + EOI.len()).collect();
                Some(image)
            }
            None => {
                if self.buf.len() > self.max_len {
                    warn!(bytes = self.buf.len(), "Discarding oversized JPEG data");
                    self.buf.clear();
                }
                None
            }
        }
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}

/// Decode a JPEG on the blocking pool
pub async fn decode_jpeg(jpeg: Vec<u8>) -> Result<RgbImage, CaptureError> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).map(|img| img.to_rgb8())
    })
    .await
    .map_err(|e| CaptureError::DecodeGlitch(format!("decoder task failed: {e}")))?
    .map_err(CaptureError::Decode)
}

/// `ffmpeg`-backed source
pub struct FfmpegSource {
    url: String,
    ffmpeg_path: String,
    open_timeout: Duration,
    output_fps: u32,
}

impl FfmpegSource {
    pub fn new(url: impl Into<String>, config: &CaptureConfig) -> Self {
        Self {
            url: url.into(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            open_timeout: config.open_timeout(),
            output_fps: config.output_fps,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        if self.url.starts_with("rtsp://") {
            cmd.args(["-rtsp_transport", "tcp"]);
        }
        cmd.args(["-i", &self.url]);
        if self.output_fps > 0 {
            cmd.arg("-vf").arg(format!("fps={}", self.output_fps));
        }
        cmd.args(["-f", "image2pipe", "-vcodec", "mjpeg", "-q:v", "3", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl VideoSource for FfmpegSource {
    async fn open(&self) -> Result<Box<dyn FrameReader>, CaptureError> {
        let mut child = self.command().spawn().map_err(|source| CaptureError::Spawn {
            program: self.ffmpeg_path.clone(),
            source,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::SourceUnavailable("decoder stdout not captured".to_string())
        })?;

        let mut reader = FfmpegReader {
            child,
            stdout,
            splitter: JpegSplitter::default(),
            pending: None,
        };

        // The source counts as open once it delivers a frame
        match tokio::time::timeout(self.open_timeout, reader.read_frame()).await {
            Ok(Ok(first)) => {
                debug!(url = %self.url, "Video source opened");
                reader.pending = Some(first);
                Ok(Box::new(reader))
            }
            Ok(Err(e)) => Err(CaptureError::SourceUnavailable(format!("{}: {e}", self.url))),
            Err(_) => Err(CaptureError::SourceUnavailable(format!(
                "{}: no frame within {:?}",
                self.url, self.open_timeout
            ))),
        }
    }

    fn describe(&self) -> &str {
        &self.url
    }
}

struct FfmpegReader {
    child: Child,
    stdout: ChildStdout,
    splitter: JpegSplitter,
    pending: Option<RgbImage>,
}

#[async_trait]
impl FrameReader for FfmpegReader {
    async fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        if let Some(first) = self.pending.take() {
            return Ok(first);
        }

        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            while let Some(jpeg) = self.splitter.next_image() {
                match decode_jpeg(jpeg).await {
                    Ok(image) => return Ok(image),
                    Err(CaptureError::Decode(e)) => {
                        warn!(error = %e, "Skipping undecodable frame");
                    }
                    Err(e) => return Err(e),
                }
            }

            let n = self
                .stdout
                .read(&mut chunk)
                .await
                .map_err(|e| CaptureError::DecodeGlitch(format!("pipe read failed: {e}")))?;
            if n == 0 {
                let status = self.child.try_wait().ok().flatten();
                return Err(CaptureError::DecodeGlitch(format!(
                    "decoder exited ({})",
                    status.map_or_else(|| "running".to_string(), |s| s.to_string())
                )));
            }
            self.splitter.push(&chunk[..n]);
        }
    }
}

/// Builds `ffmpeg` sources from the capture configuration
pub struct FfmpegSourceFactory {
    config: CaptureConfig,
}

impl FfmpegSourceFactory {
    #[must_use]
    pub const fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl SourceFactory for FfmpegSourceFactory {
    fn source_for(&self, url: &str) -> Arc<dyn VideoSource> {
        Arc::new(FfmpegSource::new(url, &self.config))
    }
}
