// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Callable endpoints.
//!
//! Requests are `POST /{name}` with `{"data": ...}`; replies are
//! `{"result": ...}`. Errors use the [`AppError`] envelope.

use crate::error::{AppError, Result};
use crate::middleware::{AuthUser, ClientIp, MaybeAuthUser};
use crate::services::credits::{
    self, StartScanRequest, StartScanResponse, UseCreditRequest, UseCreditResponse,
};
use crate::services::entitlements::{self, AccessSummary, AdminGrantOutcome, ClaimFlags};
use crate::services::rate_limit::{
    self, Caller, FixedWindowLimit, RUN_SCAN_LIMIT, START_SCAN_LIMIT, USE_CREDIT_LIMIT,
};
use crate::services::scans::{self, RunScanRequest, RunScanResponse};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request, State},
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Callable routes that require a signed-in user.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/startScan", post(start_scan))
        .route("/runBodyScan", post(run_body_scan))
        .route("/useCredit", post(use_credit))
        .route("/syncEntitlements", post(sync_entitlements))
        .route("/grantUnlimitedCredits", post(grant_unlimited_credits))
        .route("/refreshClaims", post(refresh_claims))
        .route("/deleteMyAccount", post(delete_my_account))
}

/// Callable routes open to anonymous callers.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/telemetryLog", post(telemetry_log))
}

// ─── Envelope ────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallableRequest<T> {
    #[serde(default)]
    data: Option<T>,
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Body parsed as JSON, or `T::default()` when empty.
pub(crate) fn parse_body<T>(bytes: &[u8]) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if is_blank(bytes) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes)
        .map_err(|e| AppError::InvalidArgument(format!("Invalid request body: {e}")))
}

/// Extractor for the callable `{"data": ...}` envelope.
///
/// A missing body or `data: null` yields `T::default()`.
pub struct Callable<T>(pub T);

impl<S, T> FromRequest<S> for Callable<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::InvalidArgument(e.body_text()))?;
        if is_blank(&bytes) {
            return Ok(Callable(T::default()));
        }
        let envelope: CallableRequest<T> = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::InvalidArgument(format!("Invalid request body: {e}")))?;
        Ok(Callable(envelope.data.unwrap_or_default()))
    }
}

/// Callable success envelope.
#[derive(Debug, Serialize)]
pub struct CallableResponse<T> {
    pub result: T,
}

impl<T: Serialize> IntoResponse for CallableResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

fn reply<T>(result: T) -> Result<CallableResponse<T>> {
    Ok(CallableResponse { result })
}

// ─── Credits & Scans ─────────────────────────────────────────

async fn start_scan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Callable(request): Callable<StartScanRequest>,
) -> Result<CallableResponse<StartScanResponse>> {
    let now = chrono::Utc::now();
    rate_limit::enforce_rate_limit(&state.db, &user.uid, START_SCAN_LIMIT, now).await?;
    reply(credits::start_scan(&state.db, &user.uid, request, now).await?)
}

async fn run_body_scan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Callable(request): Callable<RunScanRequest>,
) -> Result<CallableResponse<RunScanResponse>> {
    request.validate()?;
    let now = chrono::Utc::now();
    rate_limit::enforce_rate_limit(&state.db, &user.uid, RUN_SCAN_LIMIT, now).await?;
    reply(
        scans::run_body_scan(&state.db, &state.providers, &user.uid, &request.scan_id, now)
            .await?,
    )
}

async fn use_credit(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Callable(request): Callable<UseCreditRequest>,
) -> Result<CallableResponse<UseCreditResponse>> {
    request.validate()?;

    if entitlements::has_unlimited_credits(&state.config.allowlists, &user.claims) {
        tracing::debug!(uid = %user.uid, "Unlimited user, credit not charged");
        return reply(UseCreditResponse::unlimited());
    }

    let now = chrono::Utc::now();
    rate_limit::enforce_rate_limit(&state.db, &user.uid, USE_CREDIT_LIMIT, now).await?;

    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("manual");
    reply(credits::use_credit(&state.db, &user.uid, reason, now).await?)
}

// ─── Entitlements ────────────────────────────────────────────

async fn sync_entitlements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<CallableResponse<AccessSummary>> {
    let now = chrono::Utc::now();
    reply(
        entitlements::sync_entitlements(&state.db, &state.config.allowlists, &user.claims, now)
            .await?,
    )
}

#[derive(Debug, Default, Deserialize)]
struct GrantUnlimitedRequest {
    #[serde(default)]
    uid: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GrantUnlimitedResponse {
    ok: bool,
    uid: String,
    did_write: bool,
}

async fn grant_unlimited_credits(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Callable(request): Callable<GrantUnlimitedRequest>,
) -> Result<CallableResponse<GrantUnlimitedResponse>> {
    let now = chrono::Utc::now();
    let AdminGrantOutcome { did_write, .. } = entitlements::grant_unlimited_credits(
        &state.db,
        &state.config.allowlists,
        &user.claims,
        &request.uid,
        now,
    )
    .await?;

    reply(GrantUnlimitedResponse {
        ok: true,
        uid: request.uid.trim().to_string(),
        did_write,
    })
}

async fn refresh_claims(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<CallableResponse<ClaimFlags>> {
    reply(entitlements::refresh_claims(&state.db, &state.config.allowlists, &user.claims).await?)
}

// ─── Account ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DeleteAccountResponse {
    ok: bool,
    deleted: usize,
}

async fn delete_my_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<CallableResponse<DeleteAccountResponse>> {
    tracing::info!(uid = %user.uid, "User-initiated account deletion");
    let deleted = state.db.delete_user_data(&user.uid).await?;
    reply(DeleteAccountResponse { ok: true, deleted })
}

// ─── Telemetry ───────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, Validate)]
struct TelemetryRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    event: String,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

async fn telemetry_log(
    State(state): State<Arc<AppState>>,
    Extension(MaybeAuthUser(user)): Extension<MaybeAuthUser>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    Callable(request): Callable<TelemetryRequest>,
) -> Result<CallableResponse<OkResponse>> {
    request.validate()?;

    let uid = user.as_ref().map(|u| u.uid.as_str());
    let limit = FixedWindowLimit {
        key: "telemetryLog".to_string(),
        max: state.config.rate_limit_max,
        window: state.config.rate_limit_window,
    };
    let caller = Caller {
        uid,
        ip: ip.as_deref(),
    };
    rate_limit::verify_rate_limit(&state.db, caller, &limit, chrono::Utc::now()).await?;

    tracing::info!(
        event = %request.event,
        uid = uid.unwrap_or("anon"),
        detail = ?request.detail,
        "Client telemetry"
    );

    reply(OkResponse { ok: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Payload {
        #[serde(default)]
        value: u32,
    }

    async fn extract(body: &'static str) -> Result<Payload> {
        let request = Request::builder()
            .method("POST")
            .uri("/x")
            .body(Body::from(body))
            .unwrap();
        Callable::<Payload>::from_request(request, &())
            .await
            .map(|Callable(p)| p)
    }

    #[tokio::test]
    async fn envelope_defaults_and_errors() {
        assert_eq!(extract(r#"{"data":{"value":3}}"#).await.unwrap().value, 3);
        assert_eq!(extract("").await.unwrap(), Payload::default());
        assert_eq!(extract(r#"{"data":null}"#).await.unwrap(), Payload::default());
        assert_eq!(extract("{}").await.unwrap(), Payload::default());
        assert!(matches!(
            extract("not json").await,
            Err(AppError::InvalidArgument(_))
        ));
    }
}
