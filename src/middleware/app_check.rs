// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! App Check enforcement.
//!
//! - strict: a missing or invalid token is rejected with 401
//! - soft: problems are logged and the request proceeds
//! - disabled: the header is ignored

use crate::config::AppCheckMode;
use crate::error::AppError;
use crate::services::firebase_auth::TokenError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub const APP_CHECK_HEADER: &str = "x-firebase-appcheck";

pub async fn enforce_app_check(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mode = state.config.app_check_mode;
    if mode == AppCheckMode::Disabled {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(APP_CHECK_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let problem = match token {
        None => Some(TokenError::Invalid("missing App Check token".to_string())),
        Some(token) => state.app_check.verify_app_check_token(token).await.err(),
    };

    match (problem, mode) {
        (None, _) => Ok(next.run(request).await),
        (Some(e), AppCheckMode::Strict) => {
            tracing::warn!(error = %e, path = %request.uri().path(), "App Check rejected");
            Err(AppError::Unauthenticated)
        }
        (Some(e), _) => {
            tracing::warn!(error = %e, path = %request.uri().path(), "App Check soft failure");
            Ok(next.run(request).await)
        }
    }
}
