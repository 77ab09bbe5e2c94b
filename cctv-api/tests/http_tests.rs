mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cctv_api::create_router;
use cctv_core::Config;
use cctv_live::testing::ScriptedSource;

use common::{body_bytes, body_json, default_app, test_app};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn proxied(target: &str) -> String {
    format!("/proxy?url={}", target.replace(':', "%3A").replace('/', "%2F"))
}

#[tokio::test]
async fn test_health_and_root() {
    let app = create_router(default_app().state);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK");

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "CCTV Relay API");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_list_and_get_cctv() {
    let app = create_router(default_app().state);

    let response = app.clone().oneshot(get("/cctv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["devices"].as_array().unwrap().len(), 3);
    assert_eq!(body["devices"][0]["id"], "cam-1");

    let response = app.clone().oneshot(get("/cctv/cam-2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "Tugu Muda");
    assert_eq!(body["stream_url"], "https://origin/cam2/index.m3u8");

    let response = app.oneshot(get("/cctv/unknown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"detail": "CCTV not found"}));
}

#[tokio::test]
async fn test_proxy_requires_url() {
    let app = create_router(default_app().state);
    let response = app.oneshot(get("/proxy")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["detail"]
        .as_str()
        .unwrap()
        .contains("url"));
}

#[tokio::test]
async fn test_proxy_rejects_non_http_target() {
    let app = create_router(default_app().state);
    let response = app.oneshot(get(&proxied("ftp://origin/live.m3u8"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_proxy_preserves_upstream_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live/missing.m3u8"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let app = create_router(default_app().state);
    let target = format!("{}/live/missing.m3u8", server.uri());
    let response = app.oneshot(get(&proxied(&target))).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({"detail": "Failed to fetch stream"})
    );
}

#[tokio::test]
async fn test_proxy_rewrites_playlist() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live/index.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/vnd.apple.mpegurl")
                .set_body_string("#EXTM3U\n#EXTINF:4.0,\nseg1.ts\n"),
        )
        .mount(&server)
        .await;

    let app = create_router(default_app().state);
    let target = format!("{}/live/index.m3u8", server.uri());
    let response = app.oneshot(get(&proxied(&target))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.apple.mpegurl"
    );
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines[0], "#EXTM3U");
    assert_eq!(lines[1], "#EXTINF:4.0,");
    assert!(lines[2].starts_with("/proxy?relay=v1&url="));
    assert!(lines[2].ends_with("%2Flive%2Fseg1.ts"));
}

#[tokio::test]
async fn test_proxy_streams_segments_unchanged() {
    let server = MockServer::start().await;
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    Mock::given(method("GET"))
        .and(path("/live/seg1.ts"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp2t")
                .set_body_bytes(payload.clone()),
        )
        .mount(&server)
        .await;

    let app = create_router(default_app().state);
    let target = format!("{}/live/seg1.ts", server.uri());
    let response = app.oneshot(get(&proxied(&target))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp2t");
    assert_eq!(body_bytes(response).await, payload);
}

#[tokio::test]
async fn test_proxy_preflight() {
    let app = create_router(default_app().state);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/proxy")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_video_feed_without_source_is_unavailable() {
    let app = create_router(default_app().state);
    let response = app.oneshot(get("/video_feed")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_video_feed_with_primary_source() {
    let mut config = Config::default();
    config.capture.source_url = Some("rtsp://cam/primary".to_string());
    let app = test_app(config, ScriptedSource::new("scripted"));
    let hub = app.state.hub.clone();

    let response = create_router(app.state).oneshot(get("/video_feed")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );
    assert_eq!(app.factory.requested(), ["rtsp://cam/primary"]);

    drop(response);
    hub.shutdown().await;
}

#[tokio::test]
async fn test_video_feed_ends_when_primary_fails() {
    let mut config = Config::default();
    config.capture.source_url = Some("rtsp://cam/primary".to_string());
    let app = test_app(config, ScriptedSource::unavailable("scripted"));

    let response = create_router(app.state).oneshot(get("/video_feed")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = tokio::time::timeout(std::time::Duration::from_secs(5), body_bytes(response))
        .await
        .unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_analytics_create_and_list() {
    let app = create_router(default_app().state);

    for (object_type, count) in [("car", 4), ("person", 2)] {
        let body = json!({"object_type": object_type, "count": count, "area_name": "Simpang Lima"});
        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/analytics", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        assert_eq!(created["object_type"], object_type);
        assert!(created["id"].is_number());
    }

    let response = app.clone().oneshot(get("/analytics")).await.unwrap();
    let records = body_json(response).await;
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["object_type"], "person");

    let response = app.oneshot(get("/analytics?skip=1&limit=5")).await.unwrap();
    let records = body_json(response).await;
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["object_type"], "car");
}

#[tokio::test]
async fn test_analytics_rejects_negative_count() {
    let app = create_router(default_app().state);
    let body = json!({"object_type": "car", "count": -3, "area_name": "Simpang Lima"});
    let response = app
        .oneshot(json_request(Method::POST, "/analytics", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_zone_upsert_and_get() {
    let app = create_router(default_app().state);

    let response = app.clone().oneshot(get("/zones/cam-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let points = json!({"points": [{"x": 0.0, "y": 0.0}, {"x": 10.0, "y": 0.0}, {"x": 10.0, "y": 10.0}]});
    let response = app
        .clone()
        .oneshot(json_request(Method::PUT, "/zones/cam-1", &points))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/zones/cam-1")).await.unwrap();
    let zone = body_json(response).await;
    assert_eq!(zone["camera_id"], "cam-1");
    assert_eq!(zone["points"].as_array().unwrap().len(), 3);
    assert_eq!(zone["is_active"], true);

    let response = app.oneshot(get("/zones")).await.unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_zone_needs_three_points() {
    let app = create_router(default_app().state);
    let points = json!({"points": [{"x": 0.0, "y": 0.0}, {"x": 10.0, "y": 0.0}]});
    let response = app
        .oneshot(json_request(Method::PUT, "/zones/cam-1", &points))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
