//! Cache layer.
//!
//! Everything in here is advisory, never authoritative: a miss (or a cache
//! outage) always falls back to the store. The one exception is the access
//! token blacklist, whose fail-closed handling lives with the verify path in
//! [`crate::auth::jwt`].

pub mod auth_cache;
pub mod memory;
pub mod permission_cache;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use auth_cache::AuthCache;
pub use memory::MemoryCache;
pub use permission_cache::PermissionCache;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Key-value cache with TTLs and prefix invalidation.
///
/// Implementations are injected at process start; components hold an
/// `Arc<dyn KeyValueCache>` rather than reaching for a global client.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Fetch a value, `None` on miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value with a TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove one key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every key starting with `prefix`, returning the count.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Whether a key currently exists.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
