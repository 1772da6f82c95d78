// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plain HTTP endpoints (JSON in, JSON out, no callable envelope).

use super::callable::parse_body;
use crate::error::{AppError, Result};
use crate::middleware::{AuthUser, ClientIp};
use crate::services::entitlements::{self, BootstrapResponse};
use crate::services::gate::{self, GateResultRequest, GateResultResponse};
use crate::services::rate_limit::{self, Caller, FixedWindowLimit, RUN_SCAN_LIMIT};
use crate::services::scans::{self, RunScanRequest, RunScanResponse};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

/// Routes that need no caller identity.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/system/health", get(system_health))
}

/// Routes that require a signed-in user.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/system/bootstrap", post(bootstrap))
        .route("/processQueuedScanHttp", post(process_queued_scan))
        .route("/recordGateFailure", post(record_gate_failure))
}

/// JSON body; empty means `T::default()`. Errors use the app envelope.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::InvalidArgument(e.body_text()))?;
        parse_body(&bytes).map(JsonBody)
    }
}

// ─── Health ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub ok: bool,
    #[serde(rename = "hasOpenAI")]
    pub has_openai: bool,
    pub has_replicate: bool,
    pub has_stripe: bool,
    pub app_check_mode: &'static str,
    pub scan_provider: &'static str,
}

/// Configuration overview. Never fails: a DB outage reports placeholder.
async fn system_health(State(state): State<Arc<AppState>>) -> Json<SystemHealth> {
    let config = &state.config;
    let scan_provider = state.providers.selected_kind(&state.db).await.as_str();

    Json(SystemHealth {
        ok: true,
        has_openai: config.openai_api_key.is_some(),
        has_replicate: config.replicate_api_key.is_some(),
        has_stripe: config.stripe_secret.is_some(),
        app_check_mode: config.app_check_mode.as_str(),
        scan_provider,
    })
}

// ─── User Bootstrap ──────────────────────────────────────────

async fn bootstrap(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<BootstrapResponse>> {
    let now = chrono::Utc::now();
    let response =
        entitlements::bootstrap_user(&state.db, &state.config.allowlists, &user.claims, now)
            .await?;
    Ok(Json(response))
}

// ─── Scans ───────────────────────────────────────────────────

async fn process_queued_scan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    JsonBody(request): JsonBody<RunScanRequest>,
) -> Result<Json<RunScanResponse>> {
    request.validate()?;
    let now = chrono::Utc::now();
    rate_limit::enforce_rate_limit(&state.db, &user.uid, RUN_SCAN_LIMIT, now).await?;
    let response =
        scans::run_body_scan(&state.db, &state.providers, &user.uid, &request.scan_id, now)
            .await?;
    Ok(Json(response))
}

// ─── Gate ────────────────────────────────────────────────────

async fn record_gate_failure(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    JsonBody(request): JsonBody<GateResultRequest>,
) -> Result<Json<GateResultResponse>> {
    let now = chrono::Utc::now();
    let limit = FixedWindowLimit {
        key: "recordGateFailure".to_string(),
        max: state.config.rate_limit_max,
        window: state.config.rate_limit_window,
    };
    let caller = Caller {
        uid: Some(&user.uid),
        ip: ip.as_deref(),
    };
    rate_limit::verify_rate_limit(&state.db, caller, &limit, now).await?;

    let response = gate::record_gate_result(&state.db, &user.uid, request.passed, now).await?;
    Ok(Json(response))
}
