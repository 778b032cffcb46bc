//! Router tests driven through `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use testdash::api::{self, state::AppState};
use testdash::config::Config;

fn app() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.db_path = dir.path().join("results.db");
    config.storage.artifact_root = dir.path().join("screenshots");

    let service = testdash::open_service(&config).unwrap();
    let state = AppState {
        service,
        artifact_root: config.storage.artifact_root.clone(),
    };
    (dir, api::router(state, &config.server))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn result(run_id: &str, status: &str) -> Value {
    json!({
        "framework": "qa-playwright",
        "suite": "checkout",
        "testName": format!("pays with {status}"),
        "status": status,
        "duration": 1200,
        "run_id": run_id,
        "htmlReportPath": "/ci/playwright-report/index.html"
    })
}

#[tokio::test]
async fn test_health() {
    let (_dir, app) = app();
    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_submit_result_returns_created() {
    let (_dir, app) = app();
    let (status, body) = send(&app, post_json("/api/results", result("1700000000000", "passed"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["run_id"], "1700000000000");
    assert_eq!(body["data"]["htmlReportPath"], "/ci/playwright-report/index.html");
    assert!(body["data"]["id"].as_i64().is_some());
}

#[tokio::test]
async fn test_submit_rejects_invalid_payloads() {
    let (_dir, app) = app();
    let (status, body) = send(&app, post_json("/api/results", result("r1", "flaky"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unknown test status"));

    let (status, _) = send(&app, post_json("/api/results", json!({ "status": "passed" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, get("/api/results")).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_batch_then_runs_and_trends() {
    let (_dir, app) = app();
    let batch = json!([
        result("1700000000000", "passed"),
        result("1700000000000", "timedOut"),
        result("1700000000000", "interrupted"),
        result("1700003600000", "passed"),
    ]);
    let (status, body) = send(&app, post_json("/api/results/batch", batch)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["meta"]["total"], 4);

    let (_, body) = send(&app, get("/api/results/runs?framework=qa-playwright")).await;
    let runs = body["data"].as_array().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["run_id"], "1700003600000");
    assert_eq!(runs[1]["failed"], 1);
    assert_eq!(runs[1]["skipped"], 1);

    let (status, body) = send(&app, get("/api/results/trends/pass-fail?mode=weekly")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["mode"], "weekly");
    assert_eq!(body["data"][0]["label"], "13/11/2023 - 17/11/2023");

    let (_, body) = send(&app, get("/api/results/trends/automation-count?mode=date")).await;
    assert_eq!(body["data"], json!([{ "label": "14/11/2023", "count": 3 }]));

    let (_, body) = send(&app, get("/api/results/frameworks")).await;
    assert_eq!(body["data"], json!(["qa-playwright"]));
}

#[tokio::test]
async fn test_unknown_trend_mode_is_bad_request() {
    let (_dir, app) = app();
    let (status, body) = send(&app, get("/api/results/trends/pass-fail?mode=monthly")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("monthly"));
}

#[tokio::test]
async fn test_run_detail_by_id() {
    let (_dir, app) = app();
    send(&app, post_json("/api/results", result("nightly-1", "failed"))).await;

    let (status, body) = send(&app, get("/api/results/runs/nightly-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["failed"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, get("/api/results/runs/nightly-2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_run() {
    let (_dir, app) = app();
    send(&app, post_json("/api/results", result("r1", "passed"))).await;

    let delete = |uri: &str| {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };
    let (status, body) = send(&app, delete("/api/results/r1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 1);

    let (status, _) = send(&app, delete("/api/results/r1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_screenshot_upload_and_static_serving() {
    let (_dir, app) = app();
    let upload = Request::builder()
        .method("POST")
        .uri("/api/results/screenshots/r1/login%20page.png")
        .body(Body::from(&b"\x89PNG fake"[..]))
        .unwrap();
    let (status, body) = send(&app, upload).await;
    assert_eq!(status, StatusCode::CREATED);
    let url = body["data"]["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/screenshots/r1/login_page-"));

    let resp = app.clone().oneshot(get(&url)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"\x89PNG fake");

    let bad = Request::builder()
        .method("POST")
        .uri("/api/results/screenshots/r1/notes.txt")
        .body(Body::from("text"))
        .unwrap();
    let (status, _) = send(&app, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (_dir, app) = app();
    let (status, body) = send(&app, get("/api/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "not found");
}
