//! Upstream fetching for the proxy endpoint

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use url::Url;

use cctv_core::config::ProxyConfig;

const MPEGURL_TYPES: [&str; 3] = [
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "audio/mpegurl",
];
const SEGMENT_EXTENSIONS: [&str; 7] = ["ts", "m4s", "mp4", "aac", "m4a", "vtt", "webvtt"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Upstream returned {status} for {url}")]
    Upstream { status: StatusCode, url: String },

    #[error("Upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Playlist larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Failed to read upstream body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// What an upstream response carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Playlist,
    Segment,
    Opaque,
}

impl ContentKind {
    /// Classify by URL suffix, then by content type
    #[must_use]
    pub fn classify(url: &Url, content_type: Option<&str>) -> Self {
        let extension = url
            .path()
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("m3u8" | "m3u") => return Self::Playlist,
            Some(ext) if SEGMENT_EXTENSIONS.contains(&ext) => return Self::Segment,
            _ => {}
        }

        let is_mpegurl = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .is_some_and(|ct| MPEGURL_TYPES.contains(&ct.as_str()));
        if is_mpegurl {
            Self::Playlist
        } else {
            Self::Opaque
        }
    }
}

/// A successful upstream response whose body has not been read yet
#[derive(Debug)]
pub struct UpstreamResponse {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    kind: ContentKind,
    response: reqwest::Response,
}

impl UpstreamResponse {
    /// Final URL after redirects
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub const fn kind(&self) -> ContentKind {
        self.kind
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Read the whole body as text, failing once it exceeds `limit` bytes.
    pub async fn text(mut self, limit: usize) -> Result<String, FetchError> {
        let mut body = Vec::new();
        while let Some(chunk) = self.response.chunk().await.map_err(FetchError::Body)? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// The body as a byte stream, chunks forwarded as they arrive
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send {
        self.response.bytes_stream()
    }
}

/// Pooled HTTP client for upstream stream origins
#[derive(Clone)]
pub struct StreamFetcher {
    client: reqwest::Client,
    user_agent: String,
    forward_range: bool,
}

impl StreamFetcher {
    pub fn new(config: &ProxyConfig) -> Result<Self, FetchError> {
        // No overall deadline: segment bodies are streamed for as long as they last.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            forward_range: config.forward_range,
        })
    }

    /// Parse and check an absolute HTTP(S) target
    pub fn parse_target(raw: &str) -> Result<Url, FetchError> {
        let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }

    /// Request `raw_url`, forwarding the client's `Range` header when enabled.
    pub async fn fetch(
        &self,
        raw_url: &str,
        range: Option<&HeaderValue>,
    ) -> Result<UpstreamResponse, FetchError> {
        let url = Self::parse_target(raw_url)?;

        let referer = format!("{}{}", url.origin().ascii_serialization(), url.path());
        let mut request = self
            .client
            .get(url.clone())
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::REFERER, referer);
        if let Some(range) = range.filter(|_| self.forward_range) {
            request = request.header(header::RANGE, range.clone());
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Upstream request failed");
            FetchError::Transport(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "Upstream returned error status");
            return Err(FetchError::Upstream {
                status,
                url: url.to_string(),
            });
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        // The requested suffix decides; redirects often land on extensionless edge paths
        let kind = match ContentKind::classify(&url, content_type) {
            ContentKind::Opaque => ContentKind::classify(&final_url, content_type),
            kind => kind,
        };

        Ok(UpstreamResponse {
            url: final_url,
            status,
            headers,
            kind,
            response,
        })
    }
}
