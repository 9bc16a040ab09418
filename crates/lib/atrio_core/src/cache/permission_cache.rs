//! Permission cache: resolved permission sets and role names per
//! (user, agency) pair.
//!
//! Key shapes:
//! - `auth:permissions:{user_id}:{agency_id}` — JSON list of permission names
//! - `auth:roles:{user_id}:{agency_id}` — JSON list of role names
//!
//! Invalidation is entry-level for a single (user, agency), prefix-level for
//! one user across agencies, and namewide when a shared role's permission set
//! changes — the cache keeps no reverse role→users index, so the occasional
//! full sweep is the price of never serving stale elevated permissions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use super::{KeyValueCache, Result};

/// TTL for permission and role entries: 1 hour.
const ENTRY_TTL: Duration = Duration::from_secs(3600);

const PREFIX_PERMISSIONS: &str = "auth:permissions";
const PREFIX_ROLES: &str = "auth:roles";

/// Permission cache facade over an injected [`KeyValueCache`].
#[derive(Clone)]
pub struct PermissionCache {
    store: Arc<dyn KeyValueCache>,
}

impl PermissionCache {
    pub fn new(store: Arc<dyn KeyValueCache>) -> Self {
        Self { store }
    }

    fn permissions_key(user_id: Uuid, agency_id: Uuid) -> String {
        format!("{PREFIX_PERMISSIONS}:{user_id}:{agency_id}")
    }

    fn roles_key(user_id: Uuid, agency_id: Uuid) -> String {
        format!("{PREFIX_ROLES}:{user_id}:{agency_id}")
    }

    pub async fn get_permissions(
        &self,
        user_id: Uuid,
        agency_id: Uuid,
    ) -> Result<Option<HashSet<String>>> {
        match self.store.get(&Self::permissions_key(user_id, agency_id)).await? {
            Some(raw) => {
                let names: Vec<String> = serde_json::from_str(&raw)?;
                Ok(Some(names.into_iter().collect()))
            }
            None => Ok(None),
        }
    }

    pub async fn set_permissions(
        &self,
        user_id: Uuid,
        agency_id: Uuid,
        permissions: &HashSet<String>,
    ) -> Result<()> {
        let names: Vec<&String> = permissions.iter().collect();
        let raw = serde_json::to_string(&names)?;
        self.store
            .set(&Self::permissions_key(user_id, agency_id), raw, ENTRY_TTL)
            .await
    }

    pub async fn get_roles(
        &self,
        user_id: Uuid,
        agency_id: Uuid,
    ) -> Result<Option<Vec<String>>> {
        match self.store.get(&Self::roles_key(user_id, agency_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_roles(
        &self,
        user_id: Uuid,
        agency_id: Uuid,
        role_names: &[String],
    ) -> Result<()> {
        let raw = serde_json::to_string(role_names)?;
        self.store
            .set(&Self::roles_key(user_id, agency_id), raw, ENTRY_TTL)
            .await
    }

    /// Drop the permission and role entries for one (user, agency) pair.
    pub async fn invalidate(&self, user_id: Uuid, agency_id: Uuid) -> Result<()> {
        self.store
            .delete(&Self::permissions_key(user_id, agency_id))
            .await?;
        self.store.delete(&Self::roles_key(user_id, agency_id)).await
    }

    /// Drop every entry for one user across all agencies.
    pub async fn invalidate_user(&self, user_id: Uuid) -> Result<()> {
        self.store
            .delete_prefix(&format!("{PREFIX_PERMISSIONS}:{user_id}:"))
            .await?;
        self.store
            .delete_prefix(&format!("{PREFIX_ROLES}:{user_id}:"))
            .await?;
        debug!(%user_id, "invalidated permission cache for user");
        Ok(())
    }

    /// Namewide purge, used when a shared role's permission set changes or a
    /// role is deleted. Expensive but rare.
    pub async fn invalidate_all(&self) -> Result<()> {
        let perms = self.store.delete_prefix(&format!("{PREFIX_PERMISSIONS}:")).await?;
        let roles = self.store.delete_prefix(&format!("{PREFIX_ROLES}:")).await?;
        warn!(
            purged = perms + roles,
            "purged all permission cache entries after role change"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn cache() -> PermissionCache {
        PermissionCache::new(Arc::new(MemoryCache::new()))
    }

    fn set_of(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn permissions_roundtrip_per_tenant() {
        let cache = cache();
        let user = Uuid::new_v4();
        let (a1, a2) = (Uuid::new_v4(), Uuid::new_v4());

        cache
            .set_permissions(user, a1, &set_of(&["contacts.view", "contacts.edit"]))
            .await
            .unwrap();
        cache
            .set_permissions(user, a2, &set_of(&["properties.view"]))
            .await
            .unwrap();

        // Tenant isolation: entries are independent per agency.
        assert_eq!(
            cache.get_permissions(user, a1).await.unwrap(),
            Some(set_of(&["contacts.view", "contacts.edit"]))
        );
        assert_eq!(
            cache.get_permissions(user, a2).await.unwrap(),
            Some(set_of(&["properties.view"]))
        );
    }

    #[tokio::test]
    async fn invalidate_single_pair_leaves_other_agencies() {
        let cache = cache();
        let user = Uuid::new_v4();
        let (a1, a2) = (Uuid::new_v4(), Uuid::new_v4());
        cache.set_permissions(user, a1, &set_of(&["x.y"])).await.unwrap();
        cache.set_permissions(user, a2, &set_of(&["x.y"])).await.unwrap();

        cache.invalidate(user, a1).await.unwrap();
        assert!(cache.get_permissions(user, a1).await.unwrap().is_none());
        assert!(cache.get_permissions(user, a2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_user_sweeps_all_agencies() {
        let cache = cache();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let agency = Uuid::new_v4();
        cache.set_permissions(u1, agency, &set_of(&["x.y"])).await.unwrap();
        cache.set_roles(u1, agency, &["agent".into()]).await.unwrap();
        cache.set_permissions(u2, agency, &set_of(&["x.y"])).await.unwrap();

        cache.invalidate_user(u1).await.unwrap();
        assert!(cache.get_permissions(u1, agency).await.unwrap().is_none());
        assert!(cache.get_roles(u1, agency).await.unwrap().is_none());
        assert!(cache.get_permissions(u2, agency).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_all_purges_everything() {
        let cache = cache();
        let user = Uuid::new_v4();
        let agency = Uuid::new_v4();
        cache.set_permissions(user, agency, &set_of(&["x.y"])).await.unwrap();
        cache.set_roles(user, agency, &["agent".into()]).await.unwrap();

        cache.invalidate_all().await.unwrap();
        assert!(cache.get_permissions(user, agency).await.unwrap().is_none());
        assert!(cache.get_roles(user, agency).await.unwrap().is_none());
    }
}
