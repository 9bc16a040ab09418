//! Auth-related database queries.
//!
//! Mutations that participate in a login or reset transaction take a generic
//! executor so they run inside `pool.begin()` as well as directly on the pool.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::Result;
use crate::models::auth::{OneTimeTokenRecord, RefreshTokenRecord, User};
use crate::uuid::uuidv7;

const USER_COLUMNS: &str = "id, email, password_hash, display_name, is_active, is_verified, \
     email_verified_at, last_login_at, failed_login_attempts, locked_until, \
     created_at, updated_at";

/// Fetch a user by email (case-insensitive).
pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM auth_users WHERE email = lower($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Fetch a user by ID.
pub async fn find_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM auth_users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Check whether an email is already registered (case-insensitive).
pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM auth_users WHERE email = lower($1))",
    )
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Create a new user (unverified, active, zero failed attempts).
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    display_name: Option<&str>,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO auth_users (email, password_hash, display_name) \
         VALUES (lower($1), $2, $3) RETURNING {USER_COLUMNS}"
    ))
    .bind(email)
    .bind(password_hash)
    .bind(display_name)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

/// Record a failed password check: bump the counter and, when the guard says
/// so, stamp the lockout deadline.
pub async fn record_failed_login<'e>(
    exec: impl PgExecutor<'e>,
    user_id: Uuid,
    failed_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "UPDATE auth_users SET failed_login_attempts = $2, locked_until = $3, \
         updated_at = now() WHERE id = $1",
    )
    .bind(user_id)
    .bind(failed_attempts)
    .bind(locked_until)
    .execute(exec)
    .await?;
    Ok(())
}

/// Record a successful login: reset the guard and stamp last_login_at.
pub async fn record_login_success<'e>(exec: impl PgExecutor<'e>, user_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE auth_users SET failed_login_attempts = 0, locked_until = NULL, \
         last_login_at = now(), updated_at = now() WHERE id = $1",
    )
    .bind(user_id)
    .execute(exec)
    .await?;
    Ok(())
}

/// Replace the password hash and clear the lockout counters.
pub async fn update_password<'e>(
    exec: impl PgExecutor<'e>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE auth_users SET password_hash = $2, failed_login_attempts = 0, \
         locked_until = NULL, updated_at = now() WHERE id = $1",
    )
    .bind(user_id)
    .bind(password_hash)
    .execute(exec)
    .await?;
    Ok(())
}

/// Mark the user's email as verified.
pub async fn mark_email_verified<'e>(exec: impl PgExecutor<'e>, user_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE auth_users SET is_verified = TRUE, email_verified_at = now(), \
         updated_at = now() WHERE id = $1",
    )
    .bind(user_id)
    .execute(exec)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Refresh tokens
// ---------------------------------------------------------------------------

/// Store a refresh token record (digest + clear prefix, never the raw value).
pub async fn store_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &str,
    token_prefix: &str,
    expires_at: DateTime<Utc>,
    device_info: Option<&str>,
) -> Result<Uuid> {
    let id = uuidv7();
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, token_prefix, expires_at, device_info) \
         VALUES ($1, $2, $3, $4, $5, $6::jsonb)",
    )
    .bind(id)
    .bind(user_id)
    .bind(token_hash)
    .bind(token_prefix)
    .bind(expires_at)
    .bind(device_info)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Fetch all refresh token records sharing a lookup prefix. The caller
/// verifies digests in constant time and decides between invalid, revoked,
/// and expired.
pub async fn find_refresh_candidates(
    pool: &PgPool,
    token_prefix: &str,
) -> Result<Vec<RefreshTokenRecord>> {
    let rows = sqlx::query_as::<_, RefreshTokenRecord>(
        "SELECT id, user_id, token_hash, token_prefix, expires_at, revoked, revoked_at \
         FROM refresh_tokens WHERE token_prefix = $1",
    )
    .bind(token_prefix)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Revoke a refresh token by ID. Idempotent: an already-revoked row keeps its
/// original revocation timestamp.
pub async fn revoke_refresh_token<'e>(exec: impl PgExecutor<'e>, token_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = now() \
         WHERE id = $1 AND NOT revoked",
    )
    .bind(token_id)
    .execute(exec)
    .await?;
    Ok(())
}

/// Revoke every live refresh token for a user, returning the digests of the
/// rows revoked so their cache markers can be dropped.
pub async fn revoke_all_refresh_tokens<'e>(
    exec: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Vec<String>> {
    let hashes = sqlx::query_scalar::<_, String>(
        "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = now() \
         WHERE user_id = $1 AND NOT revoked RETURNING token_hash",
    )
    .bind(user_id)
    .fetch_all(exec)
    .await?;
    Ok(hashes)
}

// ---------------------------------------------------------------------------
// Single-use tokens (password reset, email verification)
// ---------------------------------------------------------------------------

/// Which single-use token table a query targets.
#[derive(Debug, Clone, Copy)]
pub enum OneTimeKind {
    PasswordReset,
    EmailVerification,
}

impl OneTimeKind {
    fn table(self) -> &'static str {
        match self {
            OneTimeKind::PasswordReset => "password_reset_tokens",
            OneTimeKind::EmailVerification => "email_verification_tokens",
        }
    }
}

/// Store a single-use token record.
pub async fn store_one_time_token(
    pool: &PgPool,
    kind: OneTimeKind,
    user_id: Uuid,
    token_hash: &str,
    token_prefix: &str,
    expires_at: DateTime<Utc>,
) -> Result<Uuid> {
    let id = uuidv7();
    let sql = format!(
        "INSERT INTO {} (id, user_id, token_hash, token_prefix, expires_at) \
         VALUES ($1, $2, $3, $4, $5)",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .bind(token_hash)
        .bind(token_prefix)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(id)
}

/// Fetch unconsumed, unexpired candidates sharing a lookup prefix.
pub async fn find_one_time_candidates(
    pool: &PgPool,
    kind: OneTimeKind,
    token_prefix: &str,
) -> Result<Vec<OneTimeTokenRecord>> {
    let sql = format!(
        "SELECT id, user_id, token_hash, expires_at, used_at \
         FROM {} WHERE token_prefix = $1 AND used_at IS NULL AND expires_at > now()",
        kind.table()
    );
    let rows = sqlx::query_as::<_, OneTimeTokenRecord>(&sql)
        .bind(token_prefix)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Consume a single-use token. A consumed token must never authorize again.
pub async fn mark_one_time_token_used<'e>(
    exec: impl PgExecutor<'e>,
    kind: OneTimeKind,
    token_id: Uuid,
) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET used_at = now() WHERE id = $1 AND used_at IS NULL",
        kind.table()
    );
    sqlx::query(&sql).bind(token_id).execute(exec).await?;
    Ok(())
}
