//! RBAC administration and introspection handlers.
//!
//! Mutations require the `roles.manage` permission in the agency named by
//! the `X-Agency-Id` header. Platform superusers pass every check.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthContext;
use crate::models::{
    AssignRoleRequest, AssignmentResponse, AttachPermissionRequest, CreatePermissionRequest,
    CreateRoleRequest, EffectivePermissionsResponse, MessageResponse, PermissionResponse,
    RevokeRoleRequest, RoleResponse, SetRolePermissionsRequest, UpdateRoleRequest,
};

/// Permission gating all RBAC administration.
const MANAGE_ROLES: &str = "roles.manage";

async fn require_manager(state: &AppState, ctx: &AuthContext) -> AppResult<Uuid> {
    let agency_id = ctx.agency()?;
    state
        .rbac
        .require_permission(ctx.user_id, agency_id, MANAGE_ROLES)
        .await?;
    Ok(agency_id)
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

/// `GET /rbac/me/permissions` — the caller's effective roles and permissions
/// in the agency from `X-Agency-Id`.
pub async fn my_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<EffectivePermissionsResponse>> {
    let agency_id = ctx.agency()?;
    let roles = state.rbac.get_user_roles(ctx.user_id, agency_id).await?;
    let mut permissions: Vec<String> = state
        .rbac
        .get_user_permissions(ctx.user_id, agency_id)
        .await?
        .into_iter()
        .collect();
    permissions.sort();
    Ok(Json(EffectivePermissionsResponse {
        agency_id,
        roles,
        permissions,
    }))
}

/// `GET /rbac/me/agencies` — every agency where the caller holds a role.
pub async fn my_agencies_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<Vec<Uuid>>> {
    let agencies = state.rbac.get_user_agencies(ctx.user_id).await?;
    Ok(Json(agencies))
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// `GET /rbac/roles` — list all roles.
pub async fn list_roles_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<Vec<RoleResponse>>> {
    require_manager(&state, &ctx).await?;
    let roles = state.rbac.list_roles().await?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

/// `POST /rbac/roles` — create a custom role.
pub async fn create_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateRoleRequest>,
) -> AppResult<Json<RoleResponse>> {
    require_manager(&state, &ctx).await?;
    let role = state
        .rbac
        .create_role(&body.name, body.description.as_deref(), &body.permission_ids)
        .await?;
    Ok(Json(RoleResponse::from(role)))
}

/// `PUT /rbac/roles/{id}` — rename or re-describe a custom role.
pub async fn update_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<UpdateRoleRequest>,
) -> AppResult<Json<RoleResponse>> {
    require_manager(&state, &ctx).await?;
    let role = state
        .rbac
        .update_role(role_id, &body.name, body.description.as_deref())
        .await?;
    Ok(Json(RoleResponse::from(role)))
}

/// `DELETE /rbac/roles/{id}` — delete a custom role and all its assignments.
pub async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    require_manager(&state, &ctx).await?;
    state.rbac.delete_role(role_id).await?;
    Ok(Json(MessageResponse::new("Role deleted")))
}

/// `GET /rbac/roles/{id}/permissions` — permissions attached to a role.
pub async fn list_role_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Vec<PermissionResponse>>> {
    require_manager(&state, &ctx).await?;
    let perms = state.rbac.list_role_permissions(role_id).await?;
    Ok(Json(perms.into_iter().map(PermissionResponse::from).collect()))
}

/// `POST /rbac/roles/{id}/permissions` — attach a permission to a role.
pub async fn attach_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<AttachPermissionRequest>,
) -> AppResult<Json<MessageResponse>> {
    require_manager(&state, &ctx).await?;
    state.rbac.attach_permission(role_id, body.permission_id).await?;
    Ok(Json(MessageResponse::new("Permission attached")))
}

/// `PUT /rbac/roles/{id}/permissions` — replace the role's permission set.
pub async fn set_role_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<SetRolePermissionsRequest>,
) -> AppResult<Json<MessageResponse>> {
    require_manager(&state, &ctx).await?;
    state
        .rbac
        .set_role_permissions(role_id, &body.permission_ids)
        .await?;
    Ok(Json(MessageResponse::new("Role permissions updated")))
}

/// `DELETE /rbac/roles/{id}/permissions/{permission_id}` — detach.
pub async fn detach_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<MessageResponse>> {
    require_manager(&state, &ctx).await?;
    state.rbac.detach_permission(role_id, permission_id).await?;
    Ok(Json(MessageResponse::new("Permission detached")))
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// `GET /rbac/permissions` — list the permission catalog.
pub async fn list_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<Vec<PermissionResponse>>> {
    require_manager(&state, &ctx).await?;
    let perms = state.rbac.list_permissions().await?;
    Ok(Json(perms.into_iter().map(PermissionResponse::from).collect()))
}

/// `POST /rbac/permissions` — register a new permission.
pub async fn create_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreatePermissionRequest>,
) -> AppResult<Json<PermissionResponse>> {
    require_manager(&state, &ctx).await?;
    let perm = state
        .rbac
        .create_permission(&body.resource, &body.action, body.description.as_deref())
        .await?;
    Ok(Json(PermissionResponse::from(perm)))
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

/// `POST /rbac/assignments` — grant a role to a user within the caller's
/// agency. Idempotent: an existing identical grant returns the same 200.
pub async fn assign_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<AssignRoleRequest>,
) -> AppResult<Json<MessageResponse>> {
    let agency_id = require_manager(&state, &ctx).await?;
    state
        .rbac
        .assign_role(body.user_id, body.role_id, agency_id, ctx.user_id, body.expires_at)
        .await?;
    Ok(Json(MessageResponse::new("Role assigned")))
}

/// `POST /rbac/assignments/revoke` — revoke a role from a user within the
/// caller's agency. Idempotent.
pub async fn revoke_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<RevokeRoleRequest>,
) -> AppResult<Json<MessageResponse>> {
    let agency_id = require_manager(&state, &ctx).await?;
    state.rbac.revoke_role(body.user_id, body.role_id, agency_id).await?;
    Ok(Json(MessageResponse::new("Role revoked")))
}

/// `GET /rbac/users/{id}/assignments` — every assignment a user holds.
pub async fn list_user_assignments_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<AssignmentResponse>>> {
    require_manager(&state, &ctx).await?;
    let rows = state.rbac.list_user_assignments(user_id).await?;
    Ok(Json(rows.into_iter().map(AssignmentResponse::from).collect()))
}
