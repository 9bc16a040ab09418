//! Permission resolution and role administration.
//!
//! Read path: cache first, store on miss, repopulate after. A cache outage
//! on this path degrades to store reads with a warning — permission data is
//! re-derivable, unlike the token blacklist.
//!
//! Write path: commit to the store, then invalidate. Assignment changes
//! touch one (user, agency) entry; role-permission changes purge namewide
//! because any number of users may hold the role.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{RbacError, Result, queries};
use crate::cache::{KeyValueCache, PermissionCache};
use crate::models::rbac::{Permission, Role, RoleAssignment};

/// Role name that grants every permission platform-wide.
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

#[derive(Clone)]
pub struct PermissionService {
    pool: PgPool,
    cache: PermissionCache,
}

impl PermissionService {
    pub fn new(pool: PgPool, store: Arc<dyn KeyValueCache>) -> Self {
        Self {
            pool,
            cache: PermissionCache::new(store),
        }
    }

    // -- resolution --------------------------------------------------------

    /// Effective permission names for a user within one agency, cache-first.
    pub async fn get_user_permissions(
        &self,
        user_id: Uuid,
        agency_id: Uuid,
    ) -> Result<HashSet<String>> {
        match self.cache.get_permissions(user_id, agency_id).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "permission cache read failed, resolving from store"),
        }

        let names = queries::resolve_permissions(&self.pool, user_id, agency_id).await?;
        let set: HashSet<String> = names.into_iter().collect();
        if let Err(e) = self.cache.set_permissions(user_id, agency_id, &set).await {
            warn!(error = %e, "permission cache write failed");
        }
        Ok(set)
    }

    /// Role names held by a user within one agency, cache-first.
    pub async fn get_user_roles(&self, user_id: Uuid, agency_id: Uuid) -> Result<Vec<String>> {
        match self.cache.get_roles(user_id, agency_id).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "role cache read failed, resolving from store"),
        }

        let names = queries::resolve_role_names(&self.pool, user_id, agency_id).await?;
        if let Err(e) = self.cache.set_roles(user_id, agency_id, &names).await {
            warn!(error = %e, "role cache write failed");
        }
        Ok(names)
    }

    /// Whether the user holds a permission in the agency. Platform superusers
    /// pass every check.
    pub async fn check_permission(
        &self,
        user_id: Uuid,
        agency_id: Uuid,
        permission: &str,
    ) -> Result<bool> {
        if self.is_platform_superuser(user_id).await? {
            return Ok(true);
        }
        let permissions = self.get_user_permissions(user_id, agency_id).await?;
        Ok(permissions.contains(permission))
    }

    /// [`check_permission`](Self::check_permission) that fails with
    /// `PermissionDenied` instead of returning false.
    pub async fn require_permission(
        &self,
        user_id: Uuid,
        agency_id: Uuid,
        permission: &str,
    ) -> Result<()> {
        if self.check_permission(user_id, agency_id, permission).await? {
            Ok(())
        } else {
            Err(RbacError::PermissionDenied(permission.to_string()))
        }
    }

    /// Whether the user holds the named role within the agency.
    pub async fn has_role(&self, user_id: Uuid, agency_id: Uuid, role_name: &str) -> Result<bool> {
        let roles = self.get_user_roles(user_id, agency_id).await?;
        Ok(roles.iter().any(|r| r == role_name))
    }

    /// Platform superuser check. Always hits the store: elevation and
    /// de-elevation must take effect immediately, never a TTL later.
    pub async fn is_platform_superuser(&self, user_id: Uuid) -> Result<bool> {
        queries::has_role_anywhere(&self.pool, user_id, SUPER_ADMIN_ROLE).await
    }

    /// Every agency where the user holds at least one unexpired role.
    pub async fn get_user_agencies(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        queries::get_user_agencies(&self.pool, user_id).await
    }

    // -- role administration -----------------------------------------------

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        queries::list_roles(&self.pool).await
    }

    pub async fn get_role(&self, role_id: Uuid) -> Result<Role> {
        queries::find_role_by_id(&self.pool, role_id)
            .await?
            .ok_or(RbacError::NotFound("role"))
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<Role> {
        queries::find_role_by_name(&self.pool, name)
            .await?
            .ok_or(RbacError::NotFound("role"))
    }

    /// Create a custom role, optionally seeded with an initial permission
    /// set. A brand-new role has no holders, so no cache purge is needed.
    pub async fn create_role(
        &self,
        name: &str,
        description: Option<&str>,
        permission_ids: &[Uuid],
    ) -> Result<Role> {
        if name.trim().is_empty() {
            return Err(RbacError::InvalidInput("role name must not be empty".into()));
        }
        if queries::find_role_by_name(&self.pool, name).await?.is_some() {
            return Err(RbacError::Conflict(format!("role '{name}' already exists")));
        }
        let role = queries::create_role(&self.pool, name, description).await?;
        for permission_id in permission_ids {
            queries::find_permission_by_id(&self.pool, *permission_id)
                .await?
                .ok_or(RbacError::NotFound("permission"))?;
            queries::attach_permission(&self.pool, role.id, *permission_id).await?;
        }
        debug!(role = %role.name, permissions = permission_ids.len(), "role created");
        Ok(role)
    }

    /// Rename or re-describe a role. System roles are immutable.
    pub async fn update_role(
        &self,
        role_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Role> {
        let existing = self.get_role(role_id).await?;
        if existing.is_system {
            return Err(RbacError::InvalidInput(format!(
                "system role '{}' cannot be modified",
                existing.name
            )));
        }
        if name.trim().is_empty() {
            return Err(RbacError::InvalidInput("role name must not be empty".into()));
        }
        if let Some(other) = queries::find_role_by_name(&self.pool, name).await? {
            if other.id != role_id {
                return Err(RbacError::Conflict(format!("role '{name}' already exists")));
            }
        }
        queries::update_role(&self.pool, role_id, name, description).await
    }

    /// Delete a role and cascade its assignments, then purge the cache
    /// namewide — every holder's resolved set just changed.
    pub async fn delete_role(&self, role_id: Uuid) -> Result<()> {
        let existing = self.get_role(role_id).await?;
        if existing.is_system {
            return Err(RbacError::InvalidInput(format!(
                "system role '{}' cannot be deleted",
                existing.name
            )));
        }
        queries::delete_role(&self.pool, role_id).await?;
        if let Err(e) = self.cache.invalidate_all().await {
            warn!(error = %e, "permission cache purge failed after role delete");
        }
        Ok(())
    }

    // -- permission administration -----------------------------------------

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        queries::list_permissions(&self.pool).await
    }

    pub async fn create_permission(
        &self,
        resource: &str,
        action: &str,
        description: Option<&str>,
    ) -> Result<Permission> {
        if resource.trim().is_empty() || action.trim().is_empty() {
            return Err(RbacError::InvalidInput(
                "permission resource and action must not be empty".into(),
            ));
        }
        let name = format!("{resource}.{action}");
        if queries::find_permission_by_name(&self.pool, &name).await?.is_some() {
            return Err(RbacError::Conflict(format!(
                "permission '{name}' already exists"
            )));
        }
        queries::create_permission(&self.pool, resource, action, description).await
    }

    pub async fn list_role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>> {
        self.get_role(role_id).await?;
        queries::list_role_permissions(&self.pool, role_id).await
    }

    /// Attach a permission to a role. Idempotent; a change purges the cache
    /// namewide.
    pub async fn attach_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        self.get_role(role_id).await?;
        queries::find_permission_by_id(&self.pool, permission_id)
            .await?
            .ok_or(RbacError::NotFound("permission"))?;

        let changed = queries::attach_permission(&self.pool, role_id, permission_id).await?;
        if changed {
            if let Err(e) = self.cache.invalidate_all().await {
                warn!(error = %e, "permission cache purge failed after attach");
            }
        }
        Ok(())
    }

    /// Replace a role's permission set wholesale. Runs in one transaction so
    /// readers never observe the half-cleared state, then purges the cache
    /// namewide.
    pub async fn set_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<()> {
        self.get_role(role_id).await?;
        for permission_id in permission_ids {
            queries::find_permission_by_id(&self.pool, *permission_id)
                .await?
                .ok_or(RbacError::NotFound("permission"))?;
        }

        let mut tx = self.pool.begin().await?;
        queries::clear_role_permissions(&mut *tx, role_id).await?;
        for permission_id in permission_ids {
            queries::attach_permission(&mut *tx, role_id, *permission_id).await?;
        }
        tx.commit().await?;

        if let Err(e) = self.cache.invalidate_all().await {
            warn!(error = %e, "permission cache purge failed after permission set replace");
        }
        Ok(())
    }

    /// Detach a permission from a role. Idempotent; a change purges the
    /// cache namewide.
    pub async fn detach_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        self.get_role(role_id).await?;
        let changed = queries::detach_permission(&self.pool, role_id, permission_id).await?;
        if changed {
            if let Err(e) = self.cache.invalidate_all().await {
                warn!(error = %e, "permission cache purge failed after detach");
            }
        }
        Ok(())
    }

    // -- assignments --------------------------------------------------------

    /// Assign a role to a user within an agency. A lapsed prior grant is
    /// replaced with a fresh one; only a still-live duplicate is the
    /// idempotent no-op, returning `None` without touching the cache.
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        agency_id: Uuid,
        granted_by: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<RoleAssignment>> {
        self.get_role(role_id).await?;
        let assignment =
            queries::assign_role(&self.pool, user_id, role_id, agency_id, granted_by, expires_at)
                .await?;
        if assignment.is_some() {
            if let Err(e) = self.cache.invalidate(user_id, agency_id).await {
                warn!(error = %e, "permission cache invalidation failed after assign");
            }
        }
        Ok(assignment)
    }

    /// Revoke one role assignment. Idempotent: returns whether a row was
    /// removed.
    pub async fn revoke_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        agency_id: Uuid,
    ) -> Result<bool> {
        let removed = queries::revoke_role(&self.pool, user_id, role_id, agency_id).await?;
        if removed {
            if let Err(e) = self.cache.invalidate(user_id, agency_id).await {
                warn!(error = %e, "permission cache invalidation failed after revoke");
            }
        }
        Ok(removed)
    }

    /// Drop every role the user holds in one agency, e.g. when they leave.
    pub async fn revoke_all_roles(&self, user_id: Uuid, agency_id: Uuid) -> Result<u64> {
        let removed = queries::revoke_all_roles(&self.pool, user_id, agency_id).await?;
        if removed > 0 {
            if let Err(e) = self.cache.invalidate(user_id, agency_id).await {
                warn!(error = %e, "permission cache invalidation failed after revoke-all");
            }
        }
        Ok(removed)
    }

    pub async fn list_user_assignments(&self, user_id: Uuid) -> Result<Vec<RoleAssignment>> {
        queries::list_user_assignments(&self.pool, user_id).await
    }
}
