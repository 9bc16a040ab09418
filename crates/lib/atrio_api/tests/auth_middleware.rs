//! Router-level tests for the authentication middleware and error mapping.
//!
//! The pool is created lazily and never connected: every asserted path is
//! rejected before any query runs, so these tests need no live PostgreSQL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header::AUTHORIZATION};
use tower::ServiceExt;
use uuid::Uuid;

use atrio_api::{AppState, config::ApiConfig};
use atrio_core::auth::jwt;
use atrio_core::auth::service::LogMailer;
use atrio_core::cache::{CacheError, KeyValueCache, MemoryCache};

const SECRET: &str = "test-secret";

fn test_config() -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: "postgres://localhost:5432/atrio_test".into(),
        jwt_secret: SECRET.into(),
    }
}

fn test_state(store: Arc<dyn KeyValueCache>) -> AppState {
    let pool = sqlx::PgPool::connect_lazy("postgres://localhost:5432/atrio_test")
        .expect("lazy pool");
    AppState::new(pool, test_config(), store, Arc::new(LogMailer))
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn issue_token() -> String {
    jwt::issue_access_token(Uuid::new_v4(), "user@example.com", HashMap::new(), SECRET.as_bytes())
        .expect("issue token")
}

/// A cache store whose every operation fails, standing in for an outage.
struct DownCache;

#[async_trait]
impl KeyValueCache for DownCache {
    async fn get(&self, _key: &str) -> atrio_core::cache::Result<Option<String>> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(
        &self,
        _key: &str,
        _value: String,
        _ttl: Duration,
    ) -> atrio_core::cache::Result<()> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> atrio_core::cache::Result<()> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> atrio_core::cache::Result<u64> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn protected_route_without_header_is_unauthorized() {
    let app = atrio_api::router(test_state(Arc::new(MemoryCache::new())));

    let req = Request::builder()
        .uri("/auth/me")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_route_with_wrong_scheme_is_unauthorized() {
    let app = atrio_api::router(test_state(Arc::new(MemoryCache::new())));

    let req = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_route_with_garbage_token_is_unauthorized() {
    let app = atrio_api::router(test_state(Arc::new(MemoryCache::new())));

    let req = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, bearer("not.a.jwt"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_other_secret_is_unauthorized() {
    let app = atrio_api::router(test_state(Arc::new(MemoryCache::new())));

    let token = jwt::issue_access_token(
        Uuid::new_v4(),
        "user@example.com",
        HashMap::new(),
        b"some-other-secret",
    )
    .unwrap();

    let req = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, bearer(&token))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blacklisted_token_is_unauthorized() {
    let state = test_state(Arc::new(MemoryCache::new()));
    let token = issue_token();

    // Revoke the token the way logout-all does.
    let claims = jwt::decode_access_token_unverified(&token).unwrap();
    state
        .auth
        .revoke_access_token(&claims.jti, 600)
        .await
        .unwrap();

    let app = atrio_api::router(state);
    let req = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, bearer(&token))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cache_outage_fails_closed_on_protected_routes() {
    // A valid token must still be rejected when the blacklist cannot be
    // consulted.
    let app = atrio_api::router(test_state(Arc::new(DownCache)));

    let req = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, bearer(&issue_token()))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn malformed_agency_header_is_rejected_before_handlers() {
    let app = atrio_api::router(test_state(Arc::new(MemoryCache::new())));

    let req = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, bearer(&issue_token()))
        .header("x-agency-id", "not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tenant_scoped_route_without_agency_header_is_bad_request() {
    let app = atrio_api::router(test_state(Arc::new(MemoryCache::new())));

    let req = Request::builder()
        .uri("/rbac/me/permissions")
        .header(AUTHORIZATION, bearer(&issue_token()))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "validation_error");
}
