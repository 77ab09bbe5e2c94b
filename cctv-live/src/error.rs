use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The source could not be opened; not retried
    #[error("Video source unavailable: {0}")]
    SourceUnavailable(String),

    /// A frame read failed; the worker reconnects
    #[error("Frame read failed: {0}")]
    DecodeGlitch(String),

    /// The decoder process could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Gave up reconnecting after {attempts} attempt(s)")]
    ReconnectExhausted { attempts: u32 },

    #[error("Failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Detector request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Detector returned status {0}")]
    Status(StatusCode),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Detector configuration error: {0}")]
    Config(String),

    #[error("Detector failed: {0}")]
    Internal(String),
}
