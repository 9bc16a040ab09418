//! In-process key-value cache with TTL-based expiration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{KeyValueCache, Result};

/// A cached entry with expiry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Dashmap-backed cache. Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.iter().filter(|e| now < e.expires_at).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if Utc::now() < entry.expires_at {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Drop the stale entry outside the read guard.
        self.entries
            .remove_if(key, |_, entry| Utc::now() >= entry.expires_at);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        // Counted inside the retain closure: the map is shared, so a
        // before/after size difference could be skewed by concurrent writes.
        let removed = AtomicU64::new(0);
        self.entries.retain(|key, _| {
            if key.starts_with(prefix) {
                removed.fetch_add(1, Ordering::Relaxed);
                false
            } else {
                true
            }
        });
        Ok(removed.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let cache = MemoryCache::new();
        assert!(cache.get("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_and_get_roundtrip() {
        let cache = MemoryCache::new();
        cache
            .set("k1", "val1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k1").await.unwrap(), Some("val1".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_returns_none() {
        let cache = MemoryCache::new();
        cache
            .set("k1", "val1".to_string(), Duration::ZERO)
            .await
            .unwrap();
        assert!(cache.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_specific_entry() {
        let cache = MemoryCache::new();
        cache
            .set("k1", "v1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("k2", "v2".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("k1").await.unwrap();
        assert!(cache.get("k1").await.unwrap().is_none());
        assert_eq!(cache.get("k2").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn delete_prefix_removes_matching_keys_only() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("auth:permissions:u1:a1", "[]".into(), ttl).await.unwrap();
        cache.set("auth:permissions:u1:a2", "[]".into(), ttl).await.unwrap();
        cache.set("auth:roles:u1:a1", "[]".into(), ttl).await.unwrap();

        let removed = cache.delete_prefix("auth:permissions:u1:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get("auth:permissions:u1:a1").await.unwrap().is_none());
        assert!(cache.get("auth:roles:u1:a1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_prefix_counts_removals_under_concurrent_writes() {
        use std::sync::Arc;

        let cache = Arc::new(MemoryCache::new());
        let ttl = Duration::from_secs(60);
        for i in 0..100 {
            cache.set(&format!("purge:{i}"), "v".into(), ttl).await.unwrap();
        }

        // Writes landing mid-sweep must not skew the removal count.
        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    cache.set(&format!("keep:{i}"), "v".into(), ttl).await.unwrap();
                }
            })
        };
        let removed = cache.delete_prefix("purge:").await.unwrap();
        writer.await.unwrap();

        assert_eq!(removed, 100);
    }

    #[tokio::test]
    async fn exists_reflects_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("k1", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.exists("k1").await.unwrap());
        assert!(!cache.exists("k2").await.unwrap());
    }
}
