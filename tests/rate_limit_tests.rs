// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rate limiter tests.
//!
//! These tests verify that:
//! 1. The sliding limiter admits `limit` events per window
//! 2. The fixed-window limiter resets after the window
//! 3. Over-limit requests get a resource-exhausted envelope
//! 4. Concurrent callers on one key never exceed the limit

use axum::body::Body;
use axum::http::{header, Request};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use futures_util::future::join_all;
use mybodyscan::config::Config;
use mybodyscan::db::{paths, FirestoreDb};
use mybodyscan::error::AppError;
use mybodyscan::models::{FixedWindowBucket, UserRateLimits};
use mybodyscan::services::rate_limit::{
    enforce_rate_limit, verify_rate_limit, Caller, FixedWindowLimit, SlidingLimit,
};
use serde_json::json;
use std::time::Duration;

mod common;
use common::{create_test_app, create_test_app_with, id_token, post_json, send};

const LIMIT: SlidingLimit = SlidingLimit {
    key: "test",
    limit: 3,
    window: Duration::from_millis(60_000),
};

#[tokio::test]
async fn test_sliding_window_admits_limit_then_recovers() {
    let db = FirestoreDb::new_in_memory();
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

    for (i, expected_remaining) in [2, 1, 0].into_iter().enumerate() {
        let at = start + ChronoDuration::seconds(i as i64);
        let remaining = enforce_rate_limit(&db, "u1", LIMIT, at).await.unwrap();
        assert_eq!(remaining, expected_remaining);
    }

    let err = enforce_rate_limit(&db, "u1", LIMIT, start + ChronoDuration::seconds(10))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ResourceExhausted(_)));
    assert_eq!(err.code(), "resource-exhausted");

    // The rejected attempt is not recorded
    let state: UserRateLimits = db
        .get_doc(&paths::user_rate_limits("u1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.buckets["test"].events.len(), 3);

    let after_window = start + ChronoDuration::milliseconds(60_001);
    assert!(enforce_rate_limit(&db, "u1", LIMIT, after_window).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sliding_callers_never_exceed_limit() {
    let db = FirestoreDb::new_in_memory();
    let now = Utc::now();

    let attempts = (0..12).map(|_| {
        let db = db.clone();
        tokio::spawn(async move { enforce_rate_limit(&db, "u1", LIMIT, now).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, LIMIT.limit as usize);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.code(), "resource-exhausted");
    }

    let state: UserRateLimits = db
        .get_doc(&paths::user_rate_limits("u1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.buckets["test"].events.len(), LIMIT.limit as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fixed_window_callers_never_exceed_max() {
    let db = FirestoreDb::new_in_memory();
    let limit = FixedWindowLimit {
        key: "recordGateFailure".to_string(),
        max: 5,
        window: Duration::from_secs(60),
    };
    let now = Utc::now();

    let attempts = (0..16).map(|_| {
        let db = db.clone();
        let limit = limit.clone();
        tokio::spawn(async move {
            let caller = Caller {
                uid: Some("u1"),
                ip: None,
            };
            verify_rate_limit(&db, caller, &limit, now).await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 5);

    let bucket: FixedWindowBucket = db
        .get_doc(&paths::fixed_window_bucket("recordGateFailure:u1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bucket.count, 5);
}

#[tokio::test]
async fn test_sliding_buckets_are_per_user_and_key() {
    let db = FirestoreDb::new_in_memory();
    let now = Utc::now();
    let other = SlidingLimit { key: "other", ..LIMIT };

    for _ in 0..3 {
        enforce_rate_limit(&db, "u1", LIMIT, now).await.unwrap();
    }
    assert!(enforce_rate_limit(&db, "u1", LIMIT, now).await.is_err());
    assert!(enforce_rate_limit(&db, "u2", LIMIT, now).await.is_ok());
    assert!(enforce_rate_limit(&db, "u1", other, now).await.is_ok());
}

#[tokio::test]
async fn test_fixed_window_resets() {
    let db = FirestoreDb::new_in_memory();
    let limit = FixedWindowLimit {
        key: "telemetryLog".to_string(),
        max: 2,
        window: Duration::from_secs(60),
    };
    let caller = Caller {
        uid: None,
        ip: Some("203.0.113.9"),
    };
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

    assert!(verify_rate_limit(&db, caller, &limit, start).await.is_ok());
    assert!(verify_rate_limit(&db, caller, &limit, start).await.is_ok());
    assert!(verify_rate_limit(&db, caller, &limit, start).await.is_err());

    let anon = Caller::default();
    assert!(verify_rate_limit(&db, anon, &limit, start).await.is_ok());

    // The window only resets once it has fully elapsed
    let boundary = start + ChronoDuration::seconds(60);
    assert!(verify_rate_limit(&db, caller, &limit, boundary)
        .await
        .is_err());

    let next_window = boundary + ChronoDuration::milliseconds(1);
    assert!(verify_rate_limit(&db, caller, &limit, next_window)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_fixed_window_store_failure_is_internal() {
    let db = FirestoreDb::new_mock();
    let limit = FixedWindowLimit {
        key: "k".to_string(),
        max: 1,
        window: Duration::from_secs(1),
    };
    let err = verify_rate_limit(&db, Caller::default(), &limit, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "internal");
}

#[tokio::test]
async fn test_start_scan_endpoint_is_rate_limited() {
    let (app, _) = create_test_app();
    let token = id_token("busy", json!({}));

    for i in 0..10 {
        let (status, body) = post_json(
            &app,
            "/startScan",
            Some(&token),
            json!({ "data": { "scanId": format!("s{i}") } }),
        )
        .await;
        // No credits, but the attempt still counts
        assert_eq!(status, 400, "attempt {i}: {body}");
    }

    let (status, body) = post_json(
        &app,
        "/startScan",
        Some(&token),
        json!({ "data": { "scanId": "s10" } }),
    )
    .await;
    assert_eq!(status, 429);
    assert_eq!(body["error"]["status"], "RESOURCE_EXHAUSTED");
    assert_eq!(body["error"]["message"], "rate_limited");
}

#[tokio::test]
async fn test_telemetry_limited_by_forwarded_ip() {
    let mut config = Config::test_default();
    config.rate_limit_max = 1;
    let (app, _) = create_test_app_with(config, FirestoreDb::new_in_memory());

    let telemetry = |ip: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/telemetryLog")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(r#"{"data":{"event":"scan_viewed"}}"#))
            .unwrap()
    };

    let (status, body) = send(&app, telemetry("198.51.100.1")).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "result": { "ok": true } }));

    let (status, _) = send(&app, telemetry("198.51.100.1")).await;
    assert_eq!(status, 429);

    let (status, _) = send(&app, telemetry("198.51.100.2")).await;
    assert_eq!(status, 200);
}
