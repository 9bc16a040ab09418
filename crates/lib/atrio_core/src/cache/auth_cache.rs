//! Session cache: user snapshots, token blacklist, refresh validity markers.
//!
//! Key shapes:
//! - `auth:user:{user_id}` — [`CachedUser`] snapshot
//! - `auth:token:blacklist:{jti}` — revoked access token marker
//! - `auth:refresh:{token_hash}` — refresh token validity marker

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::{KeyValueCache, Result};
use crate::models::auth::CachedUser;

/// TTL for cached user snapshots: 1 hour.
const USER_TTL: Duration = Duration::from_secs(3600);

/// TTL for refresh token validity markers: 30 days.
const REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Session cache facade over an injected [`KeyValueCache`].
#[derive(Clone)]
pub struct AuthCache {
    store: Arc<dyn KeyValueCache>,
}

impl AuthCache {
    pub fn new(store: Arc<dyn KeyValueCache>) -> Self {
        Self { store }
    }

    fn user_key(user_id: Uuid) -> String {
        format!("auth:user:{user_id}")
    }

    fn blacklist_key(jti: &str) -> String {
        format!("auth:token:blacklist:{jti}")
    }

    fn refresh_key(token_hash: &str) -> String {
        format!("auth:refresh:{token_hash}")
    }

    /// Fetch the cached user snapshot, if any.
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<CachedUser>> {
        match self.store.get(&Self::user_key(user_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Cache a user snapshot. Called only after the store write commits.
    pub async fn set_user(&self, user: &CachedUser) -> Result<()> {
        let raw = serde_json::to_string(user)?;
        self.store.set(&Self::user_key(user.id), raw, USER_TTL).await
    }

    pub async fn invalidate_user(&self, user_id: Uuid) -> Result<()> {
        self.store.delete(&Self::user_key(user_id)).await
    }

    /// Whether an access token jti has been blacklisted.
    pub async fn is_token_blacklisted(&self, jti: &str) -> Result<bool> {
        self.store.exists(&Self::blacklist_key(jti)).await
    }

    /// Blacklist an access token jti. `ttl` should equal the token's
    /// remaining lifetime; the marker is useless once the token expires.
    pub async fn blacklist_token(&self, jti: &str, ttl: Duration) -> Result<()> {
        let marker = format!("{{\"blacklisted_at\":\"{}\"}}", Utc::now().to_rfc3339());
        self.store.set(&Self::blacklist_key(jti), marker, ttl).await
    }

    /// Record a refresh token hash as currently valid for `user_id`.
    pub async fn set_refresh_token(&self, token_hash: &str, user_id: Uuid) -> Result<()> {
        self.store
            .set(&Self::refresh_key(token_hash), user_id.to_string(), REFRESH_TTL)
            .await
    }

    pub async fn invalidate_refresh_token(&self, token_hash: &str) -> Result<()> {
        self.store.delete(&Self::refresh_key(token_hash)).await
    }
}
