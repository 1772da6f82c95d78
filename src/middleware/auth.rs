// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase ID token authentication middleware.

use crate::error::AppError;
use crate::services::firebase_auth::{extract_bearer_token, IdTokenClaims, TokenError};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Cookie Firebase Hosting forwards to backends.
pub const SESSION_COOKIE: &str = "__session";

/// Authenticated user extracted from the ID token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub claims: IdTokenClaims,
}

impl From<IdTokenClaims> for AuthUser {
    fn from(claims: IdTokenClaims) -> Self {
        Self {
            uid: claims.sub.clone(),
            email: claims.email.clone(),
            claims,
        }
    }
}

/// Middleware that requires a valid Firebase ID token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Header first, then the hosting session cookie
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match header_value {
        Some(value) => extract_bearer_token(Some(value))
            .map_err(|_| AppError::Unauthenticated)?
            .to_string(),
        None => jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(AppError::Unauthenticated)?,
    };

    let claims = match state.id_tokens.verify_id_token(&token).await {
        Ok(claims) => claims,
        Err(TokenError::Invalid(reason)) => {
            tracing::debug!(reason = %reason, "Rejected ID token");
            return Err(AppError::Unauthenticated);
        }
        Err(TokenError::Transient(reason)) => {
            tracing::warn!(reason = %reason, "ID token verification unavailable");
            return Err(AppError::Unavailable(
                "Token verification unavailable".to_string(),
            ));
        }
    };

    request.extensions_mut().insert(AuthUser::from(claims));

    Ok(next.run(request).await)
}

/// Caller identity on routes where sign-in is optional.
#[derive(Debug, Clone, Default)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

/// Attach [`MaybeAuthUser`]; a missing or bad token just means anonymous.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| extract_bearer_token(Some(value)).ok())
        .map(str::to_string);

    let user = match token {
        Some(token) => state
            .id_tokens
            .verify_id_token(&token)
            .await
            .ok()
            .map(AuthUser::from),
        None => None,
    };

    request.extensions_mut().insert(MaybeAuthUser(user));
    next.run(request).await
}
