//! RBAC database queries.
//!
//! The resolution pipeline joins assignments → roles → role_permissions →
//! permissions, filtering expired assignments at the database so callers
//! never see a lapsed grant.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::Result;
use crate::models::rbac::{Permission, Role, RoleAssignment};
use crate::uuid::uuidv7;

/// Resolve the effective permission names for a user within one agency.
/// Expired assignments are excluded.
pub async fn resolve_permissions(
    pool: &PgPool,
    user_id: Uuid,
    agency_id: Uuid,
) -> Result<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT p.name \
         FROM user_role_assignments ura \
         JOIN role_permissions rp ON rp.role_id = ura.role_id \
         JOIN permissions p ON p.id = rp.permission_id \
         WHERE ura.user_id = $1 AND ura.agency_id = $2 \
           AND (ura.expires_at IS NULL OR ura.expires_at > now())",
    )
    .bind(user_id)
    .bind(agency_id)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// Resolve the role names held by a user within one agency.
pub async fn resolve_role_names(
    pool: &PgPool,
    user_id: Uuid,
    agency_id: Uuid,
) -> Result<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT r.name \
         FROM user_role_assignments ura \
         JOIN roles r ON r.id = ura.role_id \
         WHERE ura.user_id = $1 AND ura.agency_id = $2 \
           AND (ura.expires_at IS NULL OR ura.expires_at > now()) \
         ORDER BY r.name",
    )
    .bind(user_id)
    .bind(agency_id)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// Whether the user holds the named role in any agency, unexpired.
///
/// The platform superuser check goes through here directly rather than the
/// cache: elevation must reflect the store immediately.
pub async fn has_role_anywhere(pool: &PgPool, user_id: Uuid, role_name: &str) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS( \
           SELECT 1 FROM user_role_assignments ura \
           JOIN roles r ON r.id = ura.role_id \
           WHERE ura.user_id = $1 AND r.name = $2 \
             AND (ura.expires_at IS NULL OR ura.expires_at > now()))",
    )
    .bind(user_id)
    .bind(role_name)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Every agency where the user holds at least one unexpired role.
pub async fn get_user_agencies(pool: &PgPool, user_id: Uuid) -> Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT DISTINCT agency_id FROM user_role_assignments \
         WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > now())",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

pub async fn find_role_by_id(pool: &PgPool, role_id: Uuid) -> Result<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(
        "SELECT id, name, description, is_system FROM roles WHERE id = $1",
    )
    .bind(role_id)
    .fetch_optional(pool)
    .await?;
    Ok(role)
}

pub async fn find_role_by_name(pool: &PgPool, name: &str) -> Result<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(
        "SELECT id, name, description, is_system FROM roles WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(role)
}

pub async fn list_roles(pool: &PgPool) -> Result<Vec<Role>> {
    let roles = sqlx::query_as::<_, Role>(
        "SELECT id, name, description, is_system FROM roles ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(roles)
}

pub async fn create_role(pool: &PgPool, name: &str, description: Option<&str>) -> Result<Role> {
    let role = sqlx::query_as::<_, Role>(
        "INSERT INTO roles (id, name, description, is_system) \
         VALUES ($1, $2, $3, FALSE) RETURNING id, name, description, is_system",
    )
    .bind(uuidv7())
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(role)
}

pub async fn update_role(
    pool: &PgPool,
    role_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<Role> {
    let role = sqlx::query_as::<_, Role>(
        "UPDATE roles SET name = $2, description = $3 WHERE id = $1 \
         RETURNING id, name, description, is_system",
    )
    .bind(role_id)
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(role)
}

/// Delete a role. Assignments and role_permissions rows cascade.
pub async fn delete_role(pool: &PgPool, role_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM roles WHERE id = $1")
        .bind(role_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

pub async fn find_permission_by_id(pool: &PgPool, permission_id: Uuid) -> Result<Option<Permission>> {
    let perm = sqlx::query_as::<_, Permission>(
        "SELECT id, name, resource, action, description FROM permissions WHERE id = $1",
    )
    .bind(permission_id)
    .fetch_optional(pool)
    .await?;
    Ok(perm)
}

pub async fn find_permission_by_name(pool: &PgPool, name: &str) -> Result<Option<Permission>> {
    let perm = sqlx::query_as::<_, Permission>(
        "SELECT id, name, resource, action, description FROM permissions WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(perm)
}

pub async fn list_permissions(pool: &PgPool) -> Result<Vec<Permission>> {
    let perms = sqlx::query_as::<_, Permission>(
        "SELECT id, name, resource, action, description FROM permissions \
         ORDER BY resource, action",
    )
    .fetch_all(pool)
    .await?;
    Ok(perms)
}

pub async fn create_permission(
    pool: &PgPool,
    resource: &str,
    action: &str,
    description: Option<&str>,
) -> Result<Permission> {
    let name = format!("{resource}.{action}");
    let perm = sqlx::query_as::<_, Permission>(
        "INSERT INTO permissions (id, name, resource, action, description) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id, name, resource, action, description",
    )
    .bind(uuidv7())
    .bind(name)
    .bind(resource)
    .bind(action)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(perm)
}

/// Permissions currently attached to a role.
pub async fn list_role_permissions(pool: &PgPool, role_id: Uuid) -> Result<Vec<Permission>> {
    let perms = sqlx::query_as::<_, Permission>(
        "SELECT p.id, p.name, p.resource, p.action, p.description \
         FROM role_permissions rp JOIN permissions p ON p.id = rp.permission_id \
         WHERE rp.role_id = $1 ORDER BY p.resource, p.action",
    )
    .bind(role_id)
    .fetch_all(pool)
    .await?;
    Ok(perms)
}

/// Attach a permission to a role. Returns false when the link already exists.
pub async fn attach_permission<'e>(
    exec: impl PgExecutor<'e>,
    role_id: Uuid,
    permission_id: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(role_id)
    .bind(permission_id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Drop every permission link a role holds, returning the count removed.
pub async fn clear_role_permissions<'e>(exec: impl PgExecutor<'e>, role_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
        .bind(role_id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

/// Detach a permission from a role. Returns false when no link existed.
pub async fn detach_permission(pool: &PgPool, role_id: Uuid, permission_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2",
    )
    .bind(role_id)
    .bind(permission_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

/// Assign a role to a user within an agency. An expired prior grant is
/// replaced in place (fresh granted_by/granted_at/expires_at); only a still
/// live duplicate is the idempotent no-op, returning `None`.
pub async fn assign_role(
    pool: &PgPool,
    user_id: Uuid,
    role_id: Uuid,
    agency_id: Uuid,
    granted_by: Uuid,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Option<RoleAssignment>> {
    let assignment = sqlx::query_as::<_, RoleAssignment>(
        "INSERT INTO user_role_assignments \
           (id, user_id, role_id, agency_id, granted_by, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (user_id, role_id, agency_id) DO UPDATE \
           SET granted_by = EXCLUDED.granted_by, \
               granted_at = now(), \
               expires_at = EXCLUDED.expires_at \
           WHERE user_role_assignments.expires_at IS NOT NULL \
             AND user_role_assignments.expires_at <= now() \
         RETURNING id, user_id, role_id, agency_id, granted_by, granted_at, expires_at",
    )
    .bind(uuidv7())
    .bind(user_id)
    .bind(role_id)
    .bind(agency_id)
    .bind(granted_by)
    .bind(expires_at)
    .fetch_optional(pool)
    .await?;
    Ok(assignment)
}

/// Revoke one role assignment. Returns false when no row matched.
pub async fn revoke_role(
    pool: &PgPool,
    user_id: Uuid,
    role_id: Uuid,
    agency_id: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM user_role_assignments \
         WHERE user_id = $1 AND role_id = $2 AND agency_id = $3",
    )
    .bind(user_id)
    .bind(role_id)
    .bind(agency_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Drop every role the user holds in one agency. Returns the number of
/// assignments removed.
pub async fn revoke_all_roles(pool: &PgPool, user_id: Uuid, agency_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM user_role_assignments WHERE user_id = $1 AND agency_id = $2",
    )
    .bind(user_id)
    .bind(agency_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// All assignments for a user, across agencies, expired included.
pub async fn list_user_assignments(pool: &PgPool, user_id: Uuid) -> Result<Vec<RoleAssignment>> {
    let rows = sqlx::query_as::<_, RoleAssignment>(
        "SELECT id, user_id, role_id, agency_id, granted_by, granted_at, expires_at \
         FROM user_role_assignments WHERE user_id = $1 ORDER BY granted_at",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
