//! HTTP API integration tests
//!
//! These drive the full router with `oneshot`, injecting the peer address the
//! way the server's connect-info layer would, and verify visit counting,
//! comment ownership and the silent-denial responses.

use axum::{
    body::{Body, BodyDataStream},
    extract::ConnectInfo,
    http::{Request, StatusCode},
    Router,
};
use futures_util::StreamExt;
use profile_board::api::{self, AppState};
use profile_board::config::*;
use profile_board::storage::{LiveStore, MemoryStorage};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Helper to create test config
fn create_test_config(mode: TrustedProxyMode) -> Arc<Config> {
    Arc::new(Config {
        database: DatabaseConfig {
            backend: DatabaseBackend::Memory,
            url: String::new(),
            max_connections: 1,
        },
        api_server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        identity: IdentityConfig {
            trusted_proxy_mode: mode,
            ..IdentityConfig::default()
        },
        profile: ProfileConfig::default(),
        frontend: FrontendConfig { static_dir: None },
    })
}

fn create_app(mode: TrustedProxyMode) -> Router {
    let store = Arc::new(LiveStore::new(Arc::new(MemoryStorage::new())));
    api::create_api_router(Arc::new(AppState::new(store, create_test_config(mode))))
}

fn request(method: &str, uri: &str, from: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(ip) = from {
        let addr = SocketAddr::new(ip.parse().unwrap(), 40000);
        builder = builder.extension(ConnectInfo(addr));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn post_comment(app: &Router, from: &str, text: &str) -> String {
    let (status, body) = send(
        app,
        request("POST", "/api/comments", Some(from), Some(json!({ "text": text }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn list_as(app: &Router, from: &str) -> Vec<Value> {
    let (status, body) = send(app, request("GET", "/api/comments", Some(from), None)).await;
    assert_eq!(status, StatusCode::OK);
    body.as_array().unwrap().clone()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_app(TrustedProxyMode::None);
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OK");
}

#[tokio::test]
async fn test_ip_echo() {
    let app = create_app(TrustedProxyMode::None);

    let (status, body) = send(&app, request("GET", "/api/ip", Some("203.0.113.5"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ip"], "203.0.113.5");

    let (status, _) = send(&app, request("GET", "/api/ip", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ip_echo_behind_trusted_proxy() {
    let app = create_app(TrustedProxyMode::Standard);
    let req = Request::builder()
        .uri("/api/ip")
        .header("x-forwarded-for", "198.51.100.23")
        .extension(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 5000))))
        .body(Body::empty())
        .unwrap();

    let (_, body) = send(&app, req).await;
    assert_eq!(body["ip"], "198.51.100.23");
}

#[tokio::test]
async fn test_profile_endpoint() {
    let app = create_app(TrustedProxyMode::None);
    let (status, body) = send(&app, request("GET", "/api/profile", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "John Linek Batalha");
    assert_eq!(body["welcome_delay_ms"], 800);
}

#[tokio::test]
async fn test_visits_from_same_ip_accumulate() {
    let app = create_app(TrustedProxyMode::None);

    let (_, before) = send(&app, request("GET", "/api/visits", None, None)).await;
    let baseline = before["total"].as_i64().unwrap();

    let (status, first) = send(&app, request("POST", "/api/visits", Some("5.5.5.5"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["visitor"], 1);

    let (_, second) = send(&app, request("POST", "/api/visits", Some("5.5.5.5"), None)).await;
    assert_eq!(second["visitor"], 2);

    let (_, after) = send(&app, request("GET", "/api/visits", None, None)).await;
    assert_eq!(after["total"].as_i64().unwrap(), baseline + 2);
}

#[tokio::test]
async fn test_visit_without_identity_is_inert() {
    let app = create_app(TrustedProxyMode::None);

    let (status, _) = send(&app, request("POST", "/api/visits", None, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, total) = send(&app, request("GET", "/api/visits", None, None)).await;
    assert_eq!(total["total"], 0);
}

#[tokio::test]
async fn test_concurrent_visits_same_ip() {
    let app = create_app(TrustedProxyMode::None);

    let mut handles = vec![];
    for _ in 0..20 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            send(&app, request("POST", "/api/visits", Some("7.7.7.7"), None)).await
        }));
    }
    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    let (_, total) = send(&app, request("GET", "/api/visits", None, None)).await;
    assert_eq!(total["total"], 20);
}

#[tokio::test]
async fn test_blank_comment_is_ignored() {
    let app = create_app(TrustedProxyMode::None);

    for text in ["", "   "] {
        let (status, _) = send(
            &app,
            request("POST", "/api/comments", Some("1.2.3.4"), Some(json!({ "text": text }))),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    assert!(list_as(&app, "1.2.3.4").await.is_empty());
}

#[tokio::test]
async fn test_comment_listing_hides_author_address() {
    let app = create_app(TrustedProxyMode::None);
    let id = post_comment(&app, "1.2.3.4", "hello").await;

    let as_author = list_as(&app, "1.2.3.4").await;
    assert_eq!(as_author.len(), 1);
    assert_eq!(as_author[0]["id"], id.as_str());
    assert_eq!(as_author[0]["text"], "User4: hello");
    assert_eq!(as_author[0]["owned"], true);
    assert!(as_author[0].get("ipAddress").is_none());

    let as_stranger = list_as(&app, "4.3.2.1").await;
    assert_eq!(as_stranger[0]["owned"], false);
}

#[tokio::test]
async fn test_edit_flow_for_owner() {
    let app = create_app(TrustedProxyMode::None);
    let id = post_comment(&app, "10.0.0.9", "hi").await;

    let (status, draft) = send(
        &app,
        request("GET", &format!("/api/comments/{id}/edit"), Some("10.0.0.9"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["text"], "User9: hi");

    let (status, _) = send(
        &app,
        request(
            "PUT",
            &format!("/api/comments/{id}"),
            Some("10.0.0.9"),
            Some(json!({ "text": "bye" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let comments = list_as(&app, "10.0.0.9").await;
    assert_eq!(comments[0]["text"], "bye");
    assert_eq!(comments[0]["owned"], true);
}

#[tokio::test]
async fn test_stranger_is_silently_denied() {
    let app = create_app(TrustedProxyMode::None);
    let id = post_comment(&app, "10.0.0.9", "hi").await;

    let (status, body) = send(
        &app,
        request("GET", &format!("/api/comments/{id}/edit"), Some("10.0.0.10"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(
        &app,
        request(
            "PUT",
            &format!("/api/comments/{id}"),
            Some("10.0.0.10"),
            Some(json!({ "text": "pwned" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/comments/{id}"), Some("10.0.0.10"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let comments = list_as(&app, "10.0.0.9").await;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["text"], "User9: hi");
}

#[tokio::test]
async fn test_owner_deletes_comment() {
    let app = create_app(TrustedProxyMode::None);
    let id = post_comment(&app, "10.0.0.9", "hi").await;
    let other = post_comment(&app, "10.0.0.10", "hey").await;

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/comments/{id}"), Some("10.0.0.9"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let comments = list_as(&app, "10.0.0.9").await;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["id"], other.as_str());
}

#[tokio::test]
async fn test_missing_comment_is_silent() {
    let app = create_app(TrustedProxyMode::None);
    let (status, _) = send(
        &app,
        request("DELETE", "/api/comments/does-not-exist", Some("10.0.0.9"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_embedded_page_served() {
    let app = create_app(TrustedProxyMode::None);
    let response = app
        .clone()
        .oneshot(request("GET", "/", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("/api/comments/stream"));
    // The edit dialog stays open unless the save went through
    assert!(html.contains("!response.ok"));
}

/// Open an SSE endpoint and hand back its body as a frame stream
async fn open_stream(app: &Router, uri: &str, from: &str) -> BodyDataStream {
    let response = app
        .clone()
        .oneshot(request("GET", uri, Some(from), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    response.into_body().into_data_stream()
}

/// Read frames until one complete event arrives; returns its name and data
async fn next_event(stream: &mut BodyDataStream) -> (String, Value) {
    let mut buffer = String::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for an event")
            .expect("stream ended")
            .unwrap();
        buffer.push_str(std::str::from_utf8(&frame).unwrap());

        if let Some(end) = buffer.find("\n\n") {
            let block = &buffer[..end];
            let event = block
                .lines()
                .find_map(|l| l.strip_prefix("event: "))
                .unwrap_or_default()
                .to_string();
            let data: String = block
                .lines()
                .filter_map(|l| l.strip_prefix("data: "))
                .collect();
            if event.is_empty() {
                // keep-alive comment
                buffer.drain(..end + 2);
                continue;
            }
            return (event, serde_json::from_str(&data).unwrap());
        }
    }
}

#[tokio::test]
async fn test_visits_stream_follows_total() {
    let app = create_app(TrustedProxyMode::None);
    let mut stream = open_stream(&app, "/api/visits/stream", "8.8.8.8").await;

    let (event, data) = next_event(&mut stream).await;
    assert_eq!(event, "visits");
    assert_eq!(data, json!({ "total": 0 }));

    let (status, _) = send(&app, request("POST", "/api/visits", Some("5.5.5.5"), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (event, data) = next_event(&mut stream).await;
    assert_eq!(event, "visits");
    assert_eq!(data, json!({ "total": 1 }));
}

#[tokio::test]
async fn test_comments_stream_pushes_list_per_caller() {
    let app = create_app(TrustedProxyMode::None);
    let mut author = open_stream(&app, "/api/comments/stream", "1.2.3.4").await;
    let mut stranger = open_stream(&app, "/api/comments/stream", "4.3.2.1").await;

    for stream in [&mut author, &mut stranger] {
        let (event, data) = next_event(stream).await;
        assert_eq!(event, "comments");
        assert_eq!(data, json!([]));
    }

    let id = post_comment(&app, "1.2.3.4", "hi").await;

    let (event, data) = next_event(&mut author).await;
    assert_eq!(event, "comments");
    assert_eq!(data, json!([{ "id": id.as_str(), "text": "User4: hi", "owned": true }]));

    let (_, data) = next_event(&mut stranger).await;
    assert_eq!(data, json!([{ "id": id.as_str(), "text": "User4: hi", "owned": false }]));
    assert!(data[0].get("ipAddress").is_none());
}
