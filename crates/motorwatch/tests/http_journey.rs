//! End-to-end journeys through the HTTP surface.
//!
//! Journey 1: anonymous visitors are sent to the login page
//! Journey 2: a viewer reads the latest readings and single readings
//! Journey 3: per-motor visibility and missing readings
//! Journey 4: ingestion is reserved for operators and staff

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use motorwatch::{build_router, initialize, AppState, RootConfig, UserConfig};
use motorwatch_core::{MotorId, Timestamp};
use motorwatch_telemetry::NewReading;
use std::collections::BTreeSet;
use std::sync::Arc;
use tower::ServiceExt;

fn user(name: &str, caps: &[&str], motors: &[&str], staff: bool) -> UserConfig {
    UserConfig {
        name: name.into(),
        token: format!("t-{}", name),
        staff,
        superuser: false,
        capabilities: caps.iter().map(|c| c.to_string()).collect(),
        motors: motors.iter().map(|m| m.to_string()).collect::<BTreeSet<_>>(),
    }
}

fn journey_state(dir: &tempfile::TempDir) -> Arc<AppState> {
    let mut config = RootConfig::default();
    config.storage.database = dir.path().join("readings.db");
    config.feed.url = "http://127.0.0.1:9/feeds.json".into();
    config.feed.timeout_secs = 1;
    config.users = vec![
        user("viewer", &["view_readings"], &[], false),
        user("remote", &["view_readings"], &["m2"], false),
        user("guest", &[], &[], false),
        user("ops", &[], &[], true),
    ];
    let state = initialize(config).unwrap();
    for i in 0..8u64 {
        state
            .store
            .append(NewReading {
                motor_id: MotorId::new("m1").unwrap(),
                temperature: 40.0 + i as f64,
                voltage: 230.0,
                current: 1.5,
                x: 0.1,
                y: 0.2,
                z: 9.8,
                status: "running".into(),
                recorded_at: Timestamp::from_seconds(1_580_000_000 + i * 15),
            })
            .unwrap();
    }
    Arc::new(state)
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>) -> Response {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header("Authorization", format!("Bearer {}", token));
    }
    app.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
}

async fn body_json(resp: Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Journey 1: anonymous visitors
// ============================================================================

#[tokio::test]
async fn test_journey_anonymous_redirects_to_login() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(journey_state(&dir));

    for uri in ["/readings", "/readings/3", "/location"] {
        let resp = send(&app, "GET", uri, None).await;
        assert_eq!(resp.status(), StatusCode::FOUND, "{}", uri);
        let location = resp.headers()["location"].to_str().unwrap().to_string();
        assert!(location.starts_with("/login/?next=%2F"), "{}", location);
    }

    // unknown tokens are anonymous too
    let resp = send(&app, "GET", "/readings", Some("t-stranger")).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()["location"], "/login/?next=%2Freadings");

    let resp = send(&app, "HEAD", "/readings/3", None).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()["location"], "/login/?next=%2Freadings%2F3");

    let resp = send(&app, "GET", "/login/", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

// ============================================================================
// Journey 2: a viewer reads the dashboard
// ============================================================================

#[tokio::test]
async fn test_journey_viewer_reads_latest() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(journey_state(&dir));

    let resp = send(&app, "GET", "/readings", Some("t-viewer")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let readings = json["readings"].as_array().unwrap();
    assert_eq!(readings.len(), 6);
    // newest six, oldest first
    assert_eq!(readings[0]["id"], 3);
    assert_eq!(readings[5]["id"], 8);

    let resp = send(&app, "GET", "/readings/5", Some("t-viewer")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["reading"]["temperature"], 44.0);

    // HEAD is answered by the GET handler
    let resp = send(&app, "HEAD", "/readings/5", Some("t-viewer")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, "GET", "/location", Some("t-viewer")).await;
    let json = body_json(resp).await;
    assert_eq!(json["lat"], 12.940538);
    assert_eq!(json["lon"], 77.566287);
    assert_eq!(json["motor_id"], "m1");
}

// ============================================================================
// Journey 3: visibility and missing subjects
// ============================================================================

#[tokio::test]
async fn test_journey_subject_checks() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(journey_state(&dir));

    // "remote" may list readings but only sees motor m2
    let resp = send(&app, "GET", "/readings", Some("t-remote")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&app, "GET", "/readings/5", Some("t-remote")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let json = body_json(resp).await;
    assert_eq!(json["permission"], "can_view_reading");

    let resp = send(&app, "GET", "/readings/999", Some("t-viewer")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&app, "GET", "/readings/abc", Some("t-viewer")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&app, "GET", "/readings", Some("t-guest")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

// ============================================================================
// Journey 4: ingestion
// ============================================================================

#[tokio::test]
async fn test_journey_ingest_permissions() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(journey_state(&dir));

    let resp = send(&app, "POST", "/ingest", None).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let resp = send(&app, "POST", "/ingest", Some("t-viewer")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["permission"], "can_ingest");

    // staff bypass admits the call; the unreachable feed then surfaces as 502
    let resp = send(&app, "POST", "/ingest", Some("t-ops")).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let resp = send(&app, "GET", "/me", Some("t-ops")).await;
    let json = body_json(resp).await;
    assert_eq!(json["permissions"]["can_ingest"], true);
    assert_eq!(json["permissions"]["can_view_readings"], false);
}
