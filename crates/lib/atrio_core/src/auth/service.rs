//! Auth orchestrator: register / login / refresh / logout / reset / verify.
//!
//! `AuthService` is constructed once at process start with an explicit pool,
//! cache client, mailer, and config — no global state. Every cache write
//! happens after the authoritative store write commits (cache-aside), so a
//! crash in between costs extra store reads, never stale authorization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lockout::LockoutPolicy;
use super::queries::{self, OneTimeKind};
use super::{AuthError, Result, jwt, opaque, password};
use crate::cache::{AuthCache, KeyValueCache};
use crate::models::auth::{CachedUser, EmailNotification, User};

/// Delivery seam for the notification subsystem. The core emits
/// instructions; it does not send email and does not care whether delivery
/// succeeds.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: EmailNotification);
}

/// Default mailer: logs the instruction and drops it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, notification: EmailNotification) {
        match notification {
            EmailNotification::VerifyEmail { to, .. } => {
                info!(%to, "email verification requested");
            }
            EmailNotification::PasswordReset { to, .. } => {
                info!(%to, "password reset requested");
            }
        }
    }
}

/// Auth configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret for access tokens.
    pub jwt_secret: String,
    /// Refresh token lifetime in days.
    pub refresh_token_days: i64,
    /// Password reset token lifetime in hours.
    pub reset_token_hours: i64,
    /// Email verification token lifetime in hours.
    pub verification_token_hours: i64,
    /// Account lockout policy.
    pub lockout: LockoutPolicy,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            refresh_token_days: 30,
            reset_token_hours: 1,
            verification_token_hours: 24,
            lockout: LockoutPolicy::default(),
        }
    }
}

/// An access + refresh token pair. The refresh token is returned raw exactly
/// once; only its digest is stored.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Façade over the credential store, token codec, account guard, and
/// session cache.
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    cache: AuthCache,
    mailer: Arc<dyn Mailer>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        pool: PgPool,
        store: Arc<dyn KeyValueCache>,
        mailer: Arc<dyn Mailer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            pool,
            cache: AuthCache::new(store),
            mailer,
            config,
        }
    }

    /// The session cache this service writes through.
    pub fn cache(&self) -> &AuthCache {
        &self.cache
    }

    fn secret(&self) -> &[u8] {
        self.config.jwt_secret.as_bytes()
    }

    /// Issue an access + refresh pair and persist the refresh record.
    async fn issue_token_pair(
        &self,
        user: &User,
        device_info: Option<serde_json::Value>,
    ) -> Result<TokenPair> {
        let access_token =
            jwt::issue_access_token(user.id, &user.email, HashMap::new(), self.secret())?;

        let refresh = opaque::issue_opaque_token();
        let token_hash = opaque::hash_opaque_token(&refresh.raw);
        let expires_at = Utc::now() + Duration::days(self.config.refresh_token_days);
        let device_json = device_info.map(|v| v.to_string());

        queries::store_refresh_token(
            &self.pool,
            user.id,
            &token_hash,
            &refresh.prefix,
            expires_at,
            device_json.as_deref(),
        )
        .await?;

        if let Err(e) = self.cache.set_refresh_token(&token_hash, user.id).await {
            warn!(error = %e, "refresh marker cache write failed, continuing");
        }

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.raw,
        })
    }

    /// Repopulate the user snapshot after a store commit. Cache failures
    /// degrade to extra store reads and are only logged.
    async fn refresh_user_snapshot(&self, user: &User) {
        if let Err(e) = self.cache.invalidate_user(user.id).await {
            warn!(error = %e, "user cache invalidation failed");
        }
        if let Err(e) = self.cache.set_user(&CachedUser::from(user)).await {
            warn!(error = %e, "user cache write failed");
        }
    }

    /// Register a new user. Returns the persisted user and a fresh token
    /// pair; the raw refresh token is unrecoverable after this call.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(User, TokenPair)> {
        if queries::email_exists(&self.pool, email).await? {
            return Err(AuthError::UserAlreadyExists);
        }
        password::check_password_strength(password)?;

        let password_hash = password::hash_password(password)?;
        let user = queries::create_user(&self.pool, email, &password_hash, display_name).await?;
        info!(user_id = %user.id, "user registered");

        self.refresh_user_snapshot(&user).await;
        let pair = self.issue_token_pair(&user, None).await?;

        // Kick off email verification right away.
        let verify = opaque::issue_opaque_token();
        let expires_at = Utc::now() + Duration::hours(self.config.verification_token_hours);
        queries::store_one_time_token(
            &self.pool,
            OneTimeKind::EmailVerification,
            user.id,
            &opaque::hash_opaque_token(&verify.raw),
            &verify.prefix,
            expires_at,
        )
        .await?;
        self.mailer
            .send(EmailNotification::VerifyEmail {
                to: user.email.clone(),
                token: verify.raw,
            })
            .await;

        Ok((user, pair))
    }

    /// Authenticate with email + password.
    ///
    /// The lockout check runs before the password check so a locked account
    /// never leaks whether the supplied password was right. Guard counter
    /// updates run inside one transaction per attempt.
    pub async fn login(
        &self,
        email: &str,
        password_input: &str,
        device_info: Option<serde_json::Value>,
    ) -> Result<(User, TokenPair)> {
        let user = queries::find_user_by_email(&self.pool, email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let now = Utc::now();
        if let Some(locked_until) = self.config.lockout.locked_until(user.locked_until, now) {
            return Err(AuthError::AccountLocked { locked_until });
        }
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }

        if !password::verify_password(password_input, &user.password_hash)? {
            let (attempts, locked_until) = self
                .config
                .lockout
                .register_failure(user.failed_login_attempts, now);
            let mut tx = self.pool.begin().await?;
            queries::record_failed_login(&mut *tx, user.id, attempts, locked_until).await?;
            tx.commit().await?;
            if locked_until.is_some() {
                warn!(user_id = %user.id, attempts, "account locked after repeated failures");
            }
            return Err(AuthError::InvalidCredentials);
        }

        let mut tx = self.pool.begin().await?;
        queries::record_login_success(&mut *tx, user.id).await?;
        tx.commit().await?;

        let user = queries::find_user_by_id(&self.pool, user.id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.refresh_user_snapshot(&user).await;

        let pair = self.issue_token_pair(&user, device_info).await?;
        debug!(user_id = %user.id, "login succeeded");
        Ok((user, pair))
    }

    /// Exchange a raw refresh token for a fresh access token.
    ///
    /// The refresh token itself is not rotated: it stays valid until its own
    /// expiry or an explicit logout.
    pub async fn refresh_access_token(&self, raw_refresh_token: &str) -> Result<String> {
        let prefix = opaque::token_prefix(raw_refresh_token);
        let candidates = queries::find_refresh_candidates(&self.pool, prefix).await?;

        let record = candidates
            .into_iter()
            .find(|c| opaque::verify_opaque_token(raw_refresh_token, &c.token_hash))
            .ok_or_else(|| AuthError::InvalidToken("Invalid refresh token".into()))?;

        if record.revoked {
            return Err(AuthError::RefreshTokenRevoked);
        }
        if record.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }

        let user = queries::find_user_by_id(&self.pool, record.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }

        jwt::issue_access_token(user.id, &user.email, HashMap::new(), self.secret())
    }

    /// Revoke the refresh token matching the raw value, if any.
    ///
    /// Best-effort and idempotent: succeeds whether or not a match exists,
    /// so callers can't probe token validity through logout. A second call
    /// with the same token performs no further store mutation.
    pub async fn logout(&self, raw_refresh_token: &str) -> Result<()> {
        let prefix = opaque::token_prefix(raw_refresh_token);
        let candidates = queries::find_refresh_candidates(&self.pool, prefix).await?;

        if let Some(record) = candidates
            .into_iter()
            .find(|c| opaque::verify_opaque_token(raw_refresh_token, &c.token_hash))
        {
            if !record.revoked {
                queries::revoke_refresh_token(&self.pool, record.id).await?;
                if let Err(e) = self.cache.invalidate_refresh_token(&record.token_hash).await {
                    warn!(error = %e, "refresh marker invalidation failed");
                }
                debug!(user_id = %record.user_id, "refresh token revoked");
            }
        }
        Ok(())
    }

    /// Revoke every live refresh token the user owns and drop the session
    /// cache entry.
    pub async fn logout_all_devices(&self, user_id: Uuid) -> Result<()> {
        let hashes = queries::revoke_all_refresh_tokens(&self.pool, user_id).await?;
        for hash in &hashes {
            if let Err(e) = self.cache.invalidate_refresh_token(hash).await {
                warn!(error = %e, "refresh marker invalidation failed");
            }
        }
        if let Err(e) = self.cache.invalidate_user(user_id).await {
            warn!(error = %e, "user cache invalidation failed");
        }
        info!(%user_id, revoked = hashes.len(), "logged out all devices");
        Ok(())
    }

    /// Blacklist an access token for its remaining lifetime.
    pub async fn revoke_access_token(&self, jti: &str, remaining_secs: i64) -> Result<()> {
        let ttl = StdDuration::from_secs(remaining_secs.max(0) as u64);
        self.cache
            .blacklist_token(jti, ttl)
            .await
            .map_err(|e| AuthError::CacheUnavailable(e.to_string()))
    }

    /// Issue a password reset token (1 hour expiry).
    ///
    /// Returns `UserNotFound` for unknown emails; the entry layer maps both
    /// outcomes to the same generic success message so accounts can't be
    /// enumerated.
    pub async fn request_password_reset(&self, email: &str) -> Result<String> {
        let user = queries::find_user_by_email(&self.pool, email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let token = opaque::issue_opaque_token();
        let expires_at = Utc::now() + Duration::hours(self.config.reset_token_hours);
        queries::store_one_time_token(
            &self.pool,
            OneTimeKind::PasswordReset,
            user.id,
            &opaque::hash_opaque_token(&token.raw),
            &token.prefix,
            expires_at,
        )
        .await?;

        self.mailer
            .send(EmailNotification::PasswordReset {
                to: user.email.clone(),
                token: token.raw.clone(),
            })
            .await;
        Ok(token.raw)
    }

    /// Reset the password with a single-use token.
    ///
    /// On success every refresh token the user holds is revoked, forcing
    /// re-authentication everywhere. That cascade is a security invariant,
    /// not an optimization.
    pub async fn reset_password(&self, raw_reset_token: &str, new_password: &str) -> Result<User> {
        password::check_password_strength(new_password)?;

        let prefix = opaque::token_prefix(raw_reset_token);
        let candidates =
            queries::find_one_time_candidates(&self.pool, OneTimeKind::PasswordReset, prefix)
                .await?;
        let record = candidates
            .into_iter()
            .find(|c| opaque::verify_opaque_token(raw_reset_token, &c.token_hash))
            .ok_or_else(|| {
                AuthError::InvalidToken("Invalid or expired password reset token".into())
            })?;

        let password_hash = password::hash_password(new_password)?;

        let mut tx = self.pool.begin().await?;
        queries::update_password(&mut *tx, record.user_id, &password_hash).await?;
        queries::mark_one_time_token_used(&mut *tx, OneTimeKind::PasswordReset, record.id).await?;
        let revoked_hashes = queries::revoke_all_refresh_tokens(&mut *tx, record.user_id).await?;
        tx.commit().await?;

        for hash in &revoked_hashes {
            if let Err(e) = self.cache.invalidate_refresh_token(hash).await {
                warn!(error = %e, "refresh marker invalidation failed");
            }
        }

        let user = queries::find_user_by_id(&self.pool, record.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.refresh_user_snapshot(&user).await;
        info!(user_id = %user.id, revoked = revoked_hashes.len(), "password reset");
        Ok(user)
    }

    /// Issue an email verification token (24 hour expiry). Fails with a
    /// state conflict when the address is already verified.
    pub async fn request_email_verification(&self, user_id: Uuid) -> Result<String> {
        let user = queries::find_user_by_id(&self.pool, user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if user.is_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let token = opaque::issue_opaque_token();
        let expires_at = Utc::now() + Duration::hours(self.config.verification_token_hours);
        queries::store_one_time_token(
            &self.pool,
            OneTimeKind::EmailVerification,
            user.id,
            &opaque::hash_opaque_token(&token.raw),
            &token.prefix,
            expires_at,
        )
        .await?;

        self.mailer
            .send(EmailNotification::VerifyEmail {
                to: user.email.clone(),
                token: token.raw.clone(),
            })
            .await;
        Ok(token.raw)
    }

    /// Consume a verification token and mark the email verified.
    pub async fn verify_email(&self, raw_token: &str) -> Result<User> {
        let prefix = opaque::token_prefix(raw_token);
        let candidates =
            queries::find_one_time_candidates(&self.pool, OneTimeKind::EmailVerification, prefix)
                .await?;
        let record = candidates
            .into_iter()
            .find(|c| opaque::verify_opaque_token(raw_token, &c.token_hash))
            .ok_or_else(|| {
                AuthError::InvalidToken("Invalid or expired email verification token".into())
            })?;

        let mut tx = self.pool.begin().await?;
        queries::mark_email_verified(&mut *tx, record.user_id).await?;
        queries::mark_one_time_token_used(&mut *tx, OneTimeKind::EmailVerification, record.id)
            .await?;
        tx.commit().await?;

        let user = queries::find_user_by_id(&self.pool, record.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.refresh_user_snapshot(&user).await;
        info!(user_id = %user.id, "email verified");
        Ok(user)
    }

    /// Cache-first partial user snapshot; falls back to the store and
    /// repopulates on miss or cache outage.
    pub async fn get_user_snapshot(&self, user_id: Uuid) -> Result<Option<CachedUser>> {
        match self.cache.get_user(user_id).await {
            Ok(Some(cached)) => return Ok(Some(cached)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "user cache read failed, falling back to store"),
        }
        let Some(user) = queries::find_user_by_id(&self.pool, user_id).await? else {
            return Ok(None);
        };
        let snapshot = CachedUser::from(&user);
        if let Err(e) = self.cache.set_user(&snapshot).await {
            warn!(error = %e, "user cache write failed");
        }
        Ok(Some(snapshot))
    }

    /// Full user record by email, straight from the store.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        queries::find_user_by_email(&self.pool, email).await
    }

    /// Verify a bearer access token against this service's secret and
    /// blacklist. See [`jwt::verify_access_token`] for the fail-closed rule.
    pub async fn verify_access_token(
        &self,
        token: &str,
    ) -> Result<crate::models::auth::AccessClaims> {
        jwt::verify_access_token(token, self.secret(), &self.cache).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_policy() {
        let config = AuthConfig::new("secret");
        assert_eq!(config.refresh_token_days, 30);
        assert_eq!(config.reset_token_hours, 1);
        assert_eq!(config.verification_token_hours, 24);
        assert_eq!(config.lockout.max_failed_attempts, 5);
    }
}
