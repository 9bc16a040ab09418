//! Authentication logic: password hashing, token codec, account guard,
//! database queries, and the orchestrating [`service::AuthService`].

pub mod jwt;
pub mod lockout;
pub mod opaque;
pub mod password;
pub mod queries;
pub mod service;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User account is inactive")]
    UserInactive,

    #[error("Account is locked until {locked_until}")]
    AccountLocked { locked_until: DateTime<Utc> },

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Refresh token has been revoked")]
    RefreshTokenRevoked,

    #[error("Email is already verified")]
    AlreadyVerified,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
