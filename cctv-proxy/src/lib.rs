//! HLS relay proxy
//!
//! Fetches a remote resource and returns it to the player. Playlists are
//! buffered and rewritten so every reference proxies back through the relay;
//! everything else is streamed through as it arrives.

pub mod fetch;
pub mod playlist;

pub use fetch::{ContentKind, FetchError, StreamFetcher, UpstreamResponse};
pub use playlist::{rewrite, try_rewrite, ManifestLine, ProxyRoute, RewriteError};

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use cctv_core::config::ProxyConfig;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Headers copied from a streamed upstream response
const FORWARDED_HEADERS: [header::HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
];

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing 'url' query parameter")]
    MissingUrl,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl ProxyError {
    /// HTTP status reported to the player
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingUrl | Self::Fetch(FetchError::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            Self::Fetch(FetchError::Upstream { status, .. }) => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message reported to the player
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Fetch(FetchError::Upstream { .. }) => "Failed to fetch stream".to_string(),
            other => other.to_string(),
        }
    }
}

/// Fetcher and rewrite route bundled for the `/proxy` endpoint
#[derive(Clone)]
pub struct MediaProxy {
    fetcher: StreamFetcher,
    route: ProxyRoute,
    max_playlist_bytes: usize,
}

impl MediaProxy {
    pub fn new(config: &ProxyConfig) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: StreamFetcher::new(config)?,
            route: ProxyRoute::new(config.public_path.clone()),
            max_playlist_bytes: config.max_playlist_bytes,
        })
    }

    #[must_use]
    pub const fn route(&self) -> &ProxyRoute {
        &self.route
    }

    /// Proxy `target` for a client that sent `client_headers`.
    pub async fn handle(
        &self,
        target: Option<&str>,
        client_headers: &HeaderMap,
    ) -> Result<Response, ProxyError> {
        let target = target
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ProxyError::MissingUrl)?;

        let upstream = self
            .fetcher
            .fetch(target, client_headers.get(header::RANGE))
            .await?;

        match upstream.kind() {
            ContentKind::Playlist => {
                let base = upstream.url().clone();
                let document = upstream.text(self.max_playlist_bytes).await?;
                let rewritten = rewrite(&document, &base, &self.route);
                tracing::debug!(url = %base, bytes = rewritten.len(), "Playlist rewritten");
                playlist_response(rewritten)
            }
            ContentKind::Segment | ContentKind::Opaque => stream_response(upstream),
        }
    }
}

/// Rewritten playlist with caching disabled
pub fn playlist_response(body: String) -> Result<Response, ProxyError> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(Body::from(body))?)
}

/// Pass the upstream body through without buffering it
pub fn stream_response(upstream: UpstreamResponse) -> Result<Response, ProxyError> {
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let mut builder = Response::builder()
        .status(upstream.status())
        .header(header::CONTENT_TYPE, content_type);
    for name in &FORWARDED_HEADERS {
        if let Some(value) = upstream.headers().get(name) {
            builder = builder.header(name, value.clone());
        }
    }

    Ok(builder.body(Body::from_stream(upstream.into_stream()))?)
}

/// Preflight handler suitable for `OPTIONS` routes.
#[allow(clippy::unused_async)]
pub async fn proxy_options_preflight() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
