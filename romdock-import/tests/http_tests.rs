//! Router tests through `tower::ServiceExt::oneshot`

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use helpers::{create_pipeline, ReferenceFixture, TestPipeline, TestRoot};
use http_body_util::BodyExt;
use romdock_import::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

async fn test_app(root: &TestRoot) -> (Router, TestPipeline) {
    let fixture = ReferenceFixture::create(root.dir.path()).await;
    let pipeline = create_pipeline(root, fixture.database()).await;
    let app = build_router(AppState::new(Arc::clone(&pipeline.orchestrator)));
    (app, pipeline)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn tc_http_001_health() {
    // Given: A running router
    let root = TestRoot::new();
    let (app, _pipeline) = test_app(&root).await;

    // When: GET /health
    let response = app.oneshot(get("/health")).await.unwrap();

    // Then: 200 with module identity
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "romdock-import");
    assert!(json["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn tc_http_002_systems_list() {
    // Given: The five test systems
    let root = TestRoot::new();
    let (app, _pipeline) = test_app(&root).await;

    // When: GET /systems
    let response = app.oneshot(get("/systems")).await.unwrap();

    // Then: Every system is listed with its extensions
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let systems = json.as_array().unwrap();
    assert_eq!(systems.len(), 5);
    let psx = systems
        .iter()
        .find(|s| s["id"] == "test.psx")
        .expect("disc system listed");
    assert_eq!(psx["uses_disc_images"], true);
    assert_eq!(psx["extensions"], json!(["cue"]));
}

#[tokio::test]
async fn tc_http_003_scan_rejects_bad_paths() {
    // Given: A running router
    let root = TestRoot::new();
    let (app, _pipeline) = test_app(&root).await;

    // When: The scan names no paths, or a path that does not exist
    let empty = app
        .clone()
        .oneshot(post_json("/import/scan", json!({ "paths": [] })))
        .await
        .unwrap();
    let missing = app
        .oneshot(post_json(
            "/import/scan",
            json!({ "paths": [root.imports().join("nope.nes")] }),
        ))
        .await
        .unwrap();

    // Then: Both are bad requests with an error body
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let json = body_json(missing).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn tc_http_004_scan_runs_batch_in_background() {
    // Given: A ROM waiting in the import directory
    let root = TestRoot::new();
    let (app, _pipeline) = test_app(&root).await;
    root.drop_file("Scan.nes", &helpers::cartridge(b"scan"));

    // When: POST /import/scan without paths
    let response = app
        .clone()
        .oneshot(post_json("/import/scan", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let batch_id = body_json(response).await["batch_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Then: The batch report becomes available
    let uri = format!("/import/batches/{}", batch_id);
    let mut report = None;
    for _ in 0..50 {
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        if response.status() == StatusCode::OK {
            report = Some(body_json(response).await);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let report = report.expect("batch report never appeared");
    assert_eq!(report["batch_id"], batch_id.as_str());
    assert_eq!(report["files"][0][1]["outcome"], "imported");
    assert!(root.system_dir(helpers::NES).join("Scan.nes").exists());
}

#[tokio::test]
async fn tc_http_005_unknown_batch_is_not_found() {
    // Given: A running router
    let root = TestRoot::new();
    let (app, _pipeline) = test_app(&root).await;

    // When: A batch id nobody issued is requested
    let response = app
        .oneshot(get(&format!("/import/batches/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();

    // Then: 404
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tc_http_006_conflicts_listed_and_resolved() {
    // Given: One file held as a conflict
    let root = TestRoot::new();
    let (app, pipeline) = test_app(&root).await;
    let source = root.drop_file("Choose.bin", b"choose me");
    pipeline.orchestrator.import_batch(vec![source]).await;

    // When: GET /conflicts
    let response = app.clone().oneshot(get("/conflicts")).await.unwrap();

    // Then: The file is listed with its candidate systems
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json[0]["file_name"], "Choose.bin");
    assert_eq!(json[0]["candidate_systems"].as_array().unwrap().len(), 3);

    // When: A system is chosen for it
    let response = app
        .clone()
        .oneshot(post_json(
            "/conflicts/resolve",
            json!({ "resolutions": [{ "path": "Choose.bin", "system_id": "test.alpha" }] }),
        ))
        .await
        .unwrap();

    // Then: The report shows the import and the holding area is empty
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["files"][0][1]["outcome"], "imported");
    assert!(root.system_dir("test.alpha").join("Choose.bin").exists());

    let response = app.oneshot(get("/conflicts")).await.unwrap();
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn tc_http_007_resolve_rejects_empty_and_duplicate_requests() {
    // Given: A running router
    let root = TestRoot::new();
    let (app, _pipeline) = test_app(&root).await;

    // When: The request is empty, or names one file twice
    let empty = app
        .clone()
        .oneshot(post_json("/conflicts/resolve", json!({ "resolutions": [] })))
        .await
        .unwrap();
    let duplicate = app
        .oneshot(post_json(
            "/conflicts/resolve",
            json!({ "resolutions": [
                { "path": "A.bin", "system_id": "test.alpha" },
                { "path": "A.bin", "system_id": "test.beta" }
            ] }),
        ))
        .await
        .unwrap();

    // Then: Both are bad requests
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tc_http_008_systems_reload_swaps_registry() {
    // Given: A systems override file with a single system in the root folder
    let root = TestRoot::new();
    let (app, pipeline) = test_app(&root).await;
    let mut events = pipeline.event_bus.subscribe();
    std::fs::write(
        &root.config.layout.systems_file,
        "[[system]]\nid = \"test.only\"\nname = \"Only\"\nextensions = [\"rom\"]\n",
    )
    .unwrap();

    // When: POST /systems/reload
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/systems/reload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Then: The new list is live and the reload is announced
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["system_count"], 1);

    let response = app.oneshot(get("/systems")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"], "test.only");

    assert!(matches!(
        events.try_recv(),
        Ok(romdock_common::events::RomdockEvent::SystemsReloaded { system_count: 1, .. })
    ));
}
