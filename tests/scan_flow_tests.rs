// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scan runner tests: start a scan, run it, read the result.

use chrono::Utc;
use mybodyscan::config::Config;
use mybodyscan::db::{paths, FirestoreDb};
use mybodyscan::models::{AppConfig, BodyFatMethod, ScanStatus};
use mybodyscan::providers::ScanProviders;
use mybodyscan::services::scans::run_body_scan;
use serde_json::{json, Value};

mod common;
use common::{create_test_app, id_token, post_json, seed_user};

async fn start(app: &axum::Router, token: &str, scan_id: &str) {
    let (status, body) = post_json(
        app,
        "/startScan",
        Some(token),
        json!({
            "data": {
                "scanId": scan_id,
                "input": {
                    "poses": ["front", "left"],
                    "heightIn": 70,
                    "weightLb": 180,
                    "sex": "male"
                }
            }
        }),
    )
    .await;
    assert_eq!(status, 200, "{body}");
}

#[tokio::test]
async fn test_run_body_scan_completes_with_placeholder_metrics() {
    let (app, state) = create_test_app();
    seed_user(&state.db, "u1", 1, 0).await;
    let token = id_token("u1", json!({}));
    start(&app, &token, "scan-1").await;

    let (status, body) = post_json(
        &app,
        "/runBodyScan",
        Some(&token),
        json!({ "data": { "scanId": "scan-1" } }),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["result"]["status"], "completed");
    assert_eq!(body["result"]["metrics"]["bmi"], 25.82);
    assert_eq!(body["result"]["metrics"]["bodyFatPct"], 21.7);
    assert_eq!(body["result"]["metrics"]["method"], "deurenberg");
    assert_eq!(body["result"]["provider"], "placeholder");

    let scan = state.db.get_scan("u1", "scan-1").await.unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Completed);
    assert!(scan.completed_at.is_some());
    assert_eq!(
        scan.metrics.and_then(|m| m.method),
        Some(BodyFatMethod::Deurenberg)
    );
}

#[tokio::test]
async fn test_runner_keeps_fields_written_by_the_client() {
    let (app, state) = create_test_app();
    seed_user(&state.db, "u1", 1, 0).await;
    let token = id_token("u1", json!({}));
    start(&app, &token, "scan-1").await;

    let path = paths::scan("u1", "scan-1");
    let mut doc: Value = state.db.get_doc(&path).await.unwrap().unwrap();
    doc["note"] = json!("after breakfast");
    state.db.set_doc(&path, &doc).await.unwrap();

    run_body_scan(&state.db, &state.providers, "u1", "scan-1", Utc::now())
        .await
        .unwrap();

    let stored: Value = state.db.get_doc(&path).await.unwrap().unwrap();
    assert_eq!(stored["status"], "completed");
    assert_eq!(stored["note"], "after breakfast");
    assert_eq!(stored["creditSource"], "credit");
    assert!(stored["metrics"]["bmi"].is_number());
}

#[tokio::test]
async fn test_completed_scan_returns_stored_metrics() {
    let (app, state) = create_test_app();
    seed_user(&state.db, "u1", 1, 0).await;
    let token = id_token("u1", json!({}));
    start(&app, &token, "scan-1").await;

    let first = run_body_scan(&state.db, &state.providers, "u1", "scan-1", Utc::now())
        .await
        .unwrap();
    let before = state.db.get_scan("u1", "scan-1").await.unwrap().unwrap();

    let again = run_body_scan(&state.db, &state.providers, "u1", "scan-1", Utc::now())
        .await
        .unwrap();
    let after = state.db.get_scan("u1", "scan-1").await.unwrap().unwrap();

    assert_eq!(first.metrics, again.metrics);
    assert_eq!(before, after, "a finished scan is not rewritten");
}

#[tokio::test]
async fn test_unknown_scan_is_not_found() {
    let (app, _) = create_test_app();
    let token = id_token("u1", json!({}));

    let (status, body) = post_json(
        &app,
        "/processQueuedScanHttp",
        Some(&token),
        json!({ "scanId": "missing" }),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["status"], "NOT_FOUND");
}

#[tokio::test]
async fn test_process_queued_scan_http_uses_plain_body() {
    let (app, state) = create_test_app();
    seed_user(&state.db, "u1", 1, 0).await;
    let token = id_token("u1", json!({}));
    start(&app, &token, "scan-http").await;

    let (status, body) = post_json(
        &app,
        "/processQueuedScanHttp",
        Some(&token),
        json!({ "scanId": "scan-http" }),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn test_unconfigured_provider_marks_scan_failed() {
    let db = FirestoreDb::new_in_memory();
    let (app, state) = common::create_test_app_with(Config::test_default(), db.clone());
    db.set_app_config(&AppConfig {
        scan_provider: Some("openai".to_string()),
    })
    .await
    .unwrap();
    seed_user(&db, "u1", 1, 0).await;
    let token = id_token("u1", json!({}));
    start(&app, &token, "scan-x").await;

    let err = run_body_scan(&db, &state.providers, "u1", "scan-x", Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "unavailable");

    let scan = db.get_scan("u1", "scan-x").await.unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Failed);
    assert_eq!(scan.provider.as_deref(), Some("openai"));
    assert_eq!(scan.logs.len(), 1);
    assert!(scan.logs[0].contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn test_configured_stub_provider_labels_metrics() {
    let db = FirestoreDb::new_in_memory();
    let mut config = Config::test_default();
    config.replicate_api_key = Some("r8_test".to_string());
    let providers = ScanProviders::from_config(&config);
    db.set_app_config(&AppConfig {
        scan_provider: Some("replicate".to_string()),
    })
    .await
    .unwrap();

    let (app, _) = common::create_test_app_with(config, db.clone());
    seed_user(&db, "u1", 1, 0).await;
    start(&app, &id_token("u1", json!({})), "scan-r").await;

    let result = run_body_scan(&db, &providers, "u1", "scan-r", Utc::now())
        .await
        .unwrap();
    let metrics = result.metrics.unwrap();
    assert_eq!(metrics.provider, "replicate");
    assert!(metrics.placeholder);
}

#[tokio::test]
async fn test_gate_failures_are_counted() {
    let (app, _) = create_test_app();
    let token = id_token("u1", json!({}));

    let (status, body) = post_json(&app, "/recordGateFailure", Some(&token), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "failed": 1, "passed": 0, "remaining": 2 }));

    let (_, body) = post_json(
        &app,
        "/recordGateFailure",
        Some(&token),
        json!({ "passed": true }),
    )
    .await;
    assert_eq!(body, json!({ "failed": 1, "passed": 1, "remaining": 2 }));
}
