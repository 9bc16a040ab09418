//! # atrio_api
//!
//! HTTP API library for Atrio: authentication, session, and RBAC routes
//! over the `atrio_core` services.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use atrio_core::auth::service::{AuthConfig, AuthService, Mailer};
use atrio_core::cache::KeyValueCache;
use atrio_core::rbac::PermissionService;

use crate::config::ApiConfig;
use crate::handlers::{auth, rbac};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool.
    pub pool: PgPool,
    /// API configuration.
    pub config: ApiConfig,
    /// Authentication service.
    pub auth: AuthService,
    /// Permission service.
    pub rbac: PermissionService,
}

impl AppState {
    /// Wire up the services over one pool and one cache store.
    pub fn new(
        pool: PgPool,
        config: ApiConfig,
        store: Arc<dyn KeyValueCache>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let auth = AuthService::new(
            pool.clone(),
            store.clone(),
            mailer,
            AuthConfig::new(config.jwt_secret.clone()),
        );
        let rbac = PermissionService::new(pool.clone(), store);
        Self {
            pool,
            config,
            auth,
            rbac,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `atrio_core::migrate::migrate()` which owns the migration
/// files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    atrio_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route(
            "/auth/password-reset/request",
            post(auth::password_reset_request_handler),
        )
        .route(
            "/auth/password-reset/confirm",
            post(auth::password_reset_confirm_handler),
        )
        .route(
            "/auth/verify-email/confirm",
            post(auth::verify_email_confirm_handler),
        );

    // Protected routes (require a valid, non-blacklisted access token)
    let protected = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/logout-all", post(auth::logout_all_handler))
        .route(
            "/auth/verify-email/request",
            post(auth::verify_email_request_handler),
        )
        .route("/rbac/me/permissions", get(rbac::my_permissions_handler))
        .route("/rbac/me/agencies", get(rbac::my_agencies_handler))
        .route(
            "/rbac/roles",
            get(rbac::list_roles_handler).post(rbac::create_role_handler),
        )
        .route(
            "/rbac/roles/{id}",
            put(rbac::update_role_handler).delete(rbac::delete_role_handler),
        )
        .route(
            "/rbac/roles/{id}/permissions",
            get(rbac::list_role_permissions_handler)
                .post(rbac::attach_permission_handler)
                .put(rbac::set_role_permissions_handler),
        )
        .route(
            "/rbac/roles/{id}/permissions/{permission_id}",
            delete(rbac::detach_permission_handler),
        )
        .route(
            "/rbac/permissions",
            get(rbac::list_permissions_handler).post(rbac::create_permission_handler),
        )
        .route("/rbac/assignments", post(rbac::assign_role_handler))
        .route("/rbac/assignments/revoke", post(rbac::revoke_role_handler))
        .route(
            "/rbac/users/{id}/assignments",
            get(rbac::list_user_assignments_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
