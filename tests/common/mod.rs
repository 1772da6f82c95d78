// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use mybodyscan::config::Config;
use mybodyscan::db::FirestoreDb;
use mybodyscan::models::user::Bundle;
use mybodyscan::models::User;
use mybodyscan::providers::ScanProviders;
use mybodyscan::routes::create_router;
use mybodyscan::services::FirebaseTokenVerifier;
use mybodyscan::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"firebase-test-secret";
pub const TEST_KID: &str = "test-kid";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Sign an ID token for `uid` the static-key verifier accepts.
///
/// `extra` is merged into the standard claims (email, custom claims).
#[allow(dead_code)]
pub fn id_token(uid: &str, extra: Value) -> String {
    let config = Config::test_default();
    let now = now_secs();
    let mut claims = json!({
        "sub": uid,
        "iss": format!("https://securetoken.google.com/{}", config.gcp_project_id),
        "aud": config.gcp_project_id,
        "iat": now,
        "exp": now + 3600,
    });
    if let (Some(base), Value::Object(extra)) = (claims.as_object_mut(), extra) {
        base.extend(extra);
    }
    sign(&claims)
}

/// Sign an App Check token for this project.
#[allow(dead_code)]
pub fn app_check_token() -> String {
    let config = Config::test_default();
    let now = now_secs();
    sign(&json!({
        "sub": "1:123456789:web:abc",
        "iss": format!("https://firebaseappcheck.googleapis.com/{}", config.firebase_project_number),
        "aud": [format!("projects/{}", config.firebase_project_number)],
        "iat": now,
        "exp": now + 3600,
    }))
}

fn sign(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(TEST_KID.to_string());
    encode(&header, claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
}

/// Create a test app on the in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with(Config::test_default(), FirestoreDb::new_in_memory())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config, db: FirestoreDb) -> (axum::Router, Arc<AppState>) {
    let id_tokens = FirebaseTokenVerifier::id_tokens_with_static_key(
        &config,
        TEST_KID,
        Algorithm::HS256,
        DecodingKey::from_secret(TEST_SECRET),
    )
    .unwrap();
    let app_check = FirebaseTokenVerifier::app_check_with_static_key(
        &config,
        TEST_KID,
        Algorithm::HS256,
        DecodingKey::from_secret(TEST_SECRET),
    )
    .unwrap();
    let providers = ScanProviders::from_config(&config);

    let state = Arc::new(AppState {
        config,
        db,
        id_tokens: Arc::new(id_tokens),
        app_check: Arc::new(app_check),
        providers,
    });

    (create_router(state.clone()), state)
}

/// Store a user holding `credits` plain credits and `bundle` bundle credits.
#[allow(dead_code)]
pub async fn seed_user(db: &FirestoreDb, uid: &str, credits: i64, bundle: i64) {
    let user = User {
        credits,
        bundle: Bundle { remaining: bundle },
        ..Default::default()
    };
    db.upsert_user(uid, &user).await.unwrap();
}

/// POST a JSON body with an optional bearer token; returns status and JSON.
#[allow(dead_code)]
pub async fn post_json(
    app: &axum::Router,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    send(app, request).await
}

/// Send a request through a clone of the router; returns status and JSON.
#[allow(dead_code)]
pub async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
