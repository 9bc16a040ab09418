//! Application error types.
//!
//! Every login-path authentication failure collapses to the same 401 body so
//! responses cannot distinguish "no such account" from "wrong password".
//! Lockout is the deliberate exception: it maps to 423 because the client
//! must tell the user to wait rather than retry.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use atrio_core::auth::AuthError;
use atrio_core::rbac::RbacError;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// JSON error body returned by every failure path.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Account locked until {0}")]
    Locked(String),

    #[error("Service unavailable")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Locked(m) => (StatusCode::LOCKED, "account_locked", m.as_str()),
            // Never echo the underlying outage detail to the client.
            AppError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "Service temporarily unavailable",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };
        if matches!(self, AppError::Internal(_) | AppError::Unavailable(_)) {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            // Credential-shaped failures share one generic message.
            AuthError::InvalidCredentials
            | AuthError::UserNotFound
            | AuthError::UserInactive => {
                AppError::Unauthorized("Invalid email or password".into())
            }
            AuthError::AccountLocked { locked_until } => {
                AppError::Locked(locked_until.to_rfc3339())
            }
            AuthError::UserAlreadyExists => {
                AppError::Conflict("An account with this email already exists".into())
            }
            AuthError::AlreadyVerified => {
                AppError::Conflict("Email is already verified".into())
            }
            AuthError::TokenExpired => AppError::Unauthorized("Token has expired".into()),
            AuthError::InvalidToken(msg) => AppError::Unauthorized(msg),
            AuthError::RefreshTokenRevoked => {
                AppError::Unauthorized("Refresh token has been revoked".into())
            }
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::CacheUnavailable(msg) => AppError::Unavailable(msg),
            AuthError::Db(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<RbacError> for AppError {
    fn from(e: RbacError) -> Self {
        match e {
            RbacError::PermissionDenied(perm) => {
                AppError::Forbidden(format!("Missing permission: {perm}"))
            }
            RbacError::NotFound(what) => AppError::NotFound(what.into()),
            RbacError::Conflict(msg) => AppError::Conflict(msg),
            RbacError::InvalidInput(msg) => AppError::Validation(msg),
            RbacError::Db(e) => AppError::from(e),
            RbacError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
