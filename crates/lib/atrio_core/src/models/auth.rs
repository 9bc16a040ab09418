//! Authentication domain models.
//!
//! These are internal domain models, distinct from API-specific DTOs
//! (which have `#[serde(rename)]` for camelCase etc.).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Full user record as stored in `auth_users`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial user snapshot held in the session cache.
///
/// Deliberately a separate type from [`User`]: the cache does not carry the
/// password hash or guard counters, and callers must not rely on fields the
/// cache never guarantees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
}

impl From<&User> for CachedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            is_active: user.is_active,
            is_verified: user.is_verified,
        }
    }
}

/// Refresh token record stored in the database.
///
/// Only the sha256 digest of the raw secret is persisted; `token_prefix` is
/// the non-secret leading 8 characters, kept in the clear for indexed lookup.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub token_prefix: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Single-use opaque token record (password reset, email verification).
///
/// A non-null `used_at` means the token has been consumed and must never
/// authorize again, even before expiry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OneTimeTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject — user ID (standard JWT `sub` claim).
    pub sub: String,
    /// User email.
    pub email: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Unique token identifier, used for blacklisting.
    pub jti: String,
    /// Token type discriminator, always `"access"`.
    pub typ: String,
    /// Caller-supplied extra claims.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl AccessClaims {
    /// Parse the `sub` claim back into a user ID.
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Seconds until expiry, clamped at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.exp - now.timestamp()).max(0)
    }
}

/// Instruction for the notification subsystem.
///
/// The core emits these after registration, password-reset requests, and
/// verification requests; it never sends email itself and does not care
/// whether delivery succeeds.
#[derive(Debug, Clone, PartialEq)]
pub enum EmailNotification {
    VerifyEmail { to: String, token: String },
    PasswordReset { to: String, token: String },
}
