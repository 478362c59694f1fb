// Integration tests for `BackendProbe` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hbee_api::{BackendProbe, Error, ReadinessProbe};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, BackendProbe) {
    let server = MockServer::start().await;
    let url = format!("{}/api/mqtt/status", server.uri()).parse().unwrap();
    let probe = BackendProbe::new(url, Duration::from_secs(5)).unwrap();
    (server, probe)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ready_backend() {
    let (server, probe) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/mqtt/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "backendReady": true,
            "connected": true,
            "message": "ok",
            "initializationDuration": 1200
        })))
        .mount(&server)
        .await;

    let status = probe.check().await.unwrap();
    assert!(status.is_ready());
    assert_eq!(status.message.as_deref(), Some("ok"));
}

#[tokio::test]
async fn test_backend_still_starting() {
    let (server, probe) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/mqtt/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "backendReady": false,
            "connected": false,
            "message": "initializing"
        })))
        .mount(&server)
        .await;

    let status = probe.check().await.unwrap();
    assert!(!status.is_ready());
}

#[tokio::test]
async fn test_http_error_status() {
    let (server, probe) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/mqtt/status"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = probe.check().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn test_non_json_body() {
    let (server, probe) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/mqtt/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    match probe.check().await.unwrap_err() {
        Error::Deserialization { body, .. } => assert!(body.contains("login")),
        other => panic!("expected deserialization error, got {other:?}"),
    }
}
