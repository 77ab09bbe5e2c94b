//! HLS proxy endpoint
//!
//! `GET /proxy?url=<absolute-url>` fetches the target for the player.
//! Playlists come back rewritten so that every segment, key and variant is
//! requested through this endpoint again; other content is streamed as is.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;

use cctv_proxy::proxy_options_preflight;

use crate::http::{AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

pub fn create_proxy_router() -> Router<AppState> {
    Router::new().route("/proxy", get(proxy_stream).options(proxy_options_preflight))
}

/// GET /proxy?url=
pub async fn proxy_stream(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    Ok(state.proxy.handle(query.url.as_deref(), &headers).await?)
}
