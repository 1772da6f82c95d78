// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Variants mirror the Cloud Functions `HttpsError` codes so clients can
//! branch on `status` the same way for callable and plain HTTP endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message used when a user has neither bundle nor plain credits left.
    pub const NO_CREDITS: &'static str = "No credits";

    /// Callable error code (`resource-exhausted`, `not-found`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::PermissionDenied(_) => "permission-denied",
            AppError::NotFound(_) => "not-found",
            AppError::InvalidArgument(_) => "invalid-argument",
            AppError::FailedPrecondition(_) => "failed-precondition",
            AppError::ResourceExhausted(_) => "resource-exhausted",
            AppError::Unavailable(_) => "unavailable",
            AppError::Database(_) | AppError::Internal(_) => "internal",
        }
    }

    /// HTTP status for the error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidArgument(_) | AppError::FailedPrecondition(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true if the caller may retry after backoff or a top-up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ResourceExhausted(_) | AppError::Unavailable(_)
        ) || self.is_no_credits()
    }

    /// Returns true if this is the "no credits" failed-precondition.
    pub fn is_no_credits(&self) -> bool {
        matches!(self, AppError::FailedPrecondition(msg) if msg == Self::NO_CREDITS)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::InvalidArgument(errors.to_string())
    }
}

/// JSON error response body, shaped like the callable protocol error.
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    status: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                "internal".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                "internal".to_string()
            }
            AppError::Unauthenticated => "Authentication required".to_string(),
            AppError::PermissionDenied(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidArgument(msg)
            | AppError::FailedPrecondition(msg)
            | AppError::ResourceExhausted(msg)
            | AppError::Unavailable(msg) => msg.clone(),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                status: self.code().replace('-', "_").to_uppercase(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
