//! Service-layer tests against a live PostgreSQL.
//!
//! These run only when `DATABASE_URL` is set; otherwise each test returns
//! early so the suite stays green without a database. Every test creates
//! its own users/agencies with unique names, so the suite is safe to run
//! repeatedly against the same database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use atrio_core::auth::AuthError;
use atrio_core::auth::service::{AuthConfig, AuthService, LogMailer};
use atrio_core::cache::MemoryCache;
use atrio_core::rbac::PermissionService;

const PASSWORD: &str = "Str0ng!Pass";

async fn connect() -> Option<PgPool> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping");
            return None;
        }
    };
    let pool = PgPool::connect(&url).await.expect("connect to postgres");
    atrio_core::migrate::migrate(&pool).await.expect("migrate");
    Some(pool)
}

fn services(pool: &PgPool) -> (AuthService, PermissionService) {
    let store = Arc::new(MemoryCache::new());
    let auth = AuthService::new(
        pool.clone(),
        store.clone(),
        Arc::new(LogMailer),
        AuthConfig::new("test-secret"),
    );
    let rbac = PermissionService::new(pool.clone(), store);
    (auth, rbac)
}

fn unique_email() -> String {
    format!("user-{}@example.com", Uuid::new_v4().simple())
}

async fn create_agency(pool: &PgPool) -> Uuid {
    sqlx::query_scalar::<_, Uuid>("INSERT INTO agencies (name) VALUES ($1) RETURNING id")
        .bind(format!("agency-{}", Uuid::new_v4().simple()))
        .fetch_one(pool)
        .await
        .expect("create agency")
}

#[tokio::test]
async fn account_locks_after_exactly_five_failures() {
    let Some(pool) = connect().await else { return };
    let (auth, _) = services(&pool);
    let email = unique_email();
    auth.register(&email, PASSWORD, None).await.expect("register");

    // Failures 1 through 5 all report bad credentials; the fifth trips
    // the lock.
    for attempt in 1..=5 {
        let err = auth.login(&email, "Wr0ng!Pass", None).await.unwrap_err();
        assert!(
            matches!(err, AuthError::InvalidCredentials),
            "attempt {attempt}: {err:?}"
        );
    }

    // While locked even the right password is refused, without revealing
    // that it was right.
    let err = auth.login(&email, PASSWORD, None).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }), "{err:?}");
}

#[tokio::test]
async fn logout_is_idempotent() {
    let Some(pool) = connect().await else { return };
    let (auth, _) = services(&pool);
    let email = unique_email();
    let (_, pair) = auth.register(&email, PASSWORD, None).await.expect("register");

    auth.logout(&pair.refresh_token).await.expect("first logout");
    auth.logout(&pair.refresh_token).await.expect("second logout");

    let err = auth.refresh_access_token(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshTokenRevoked), "{err:?}");
}

#[tokio::test]
async fn password_reset_revokes_sessions_and_consumes_the_token() {
    let Some(pool) = connect().await else { return };
    let (auth, _) = services(&pool);
    let email = unique_email();
    let (_, pair) = auth.register(&email, PASSWORD, None).await.expect("register");

    let token = auth.request_password_reset(&email).await.expect("request reset");
    auth.reset_password(&token, "N3w!Password").await.expect("reset");

    // Every refresh token issued before the reset is dead.
    let err = auth.refresh_access_token(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshTokenRevoked), "{err:?}");

    // The reset token is single-use.
    let err = auth.reset_password(&token, "An0ther!Pass").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)), "{err:?}");

    // Old password out, new password in.
    let err = auth.login(&email, PASSWORD, None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials), "{err:?}");
    auth.login(&email, "N3w!Password", None)
        .await
        .expect("login with new password");
}

#[tokio::test]
async fn verification_token_is_single_use() {
    let Some(pool) = connect().await else { return };
    let (auth, _) = services(&pool);
    let email = unique_email();
    let (user, _) = auth.register(&email, PASSWORD, None).await.expect("register");

    let token = auth
        .request_email_verification(user.id)
        .await
        .expect("request verification");
    let verified = auth.verify_email(&token).await.expect("verify");
    assert!(verified.is_verified);

    let err = auth.verify_email(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)), "{err:?}");

    let err = auth.request_email_verification(user.id).await.unwrap_err();
    assert!(matches!(err, AuthError::AlreadyVerified), "{err:?}");
}

#[tokio::test]
async fn assign_resolve_revoke_roundtrip() {
    let Some(pool) = connect().await else { return };
    let (auth, rbac) = services(&pool);
    let email = unique_email();
    let (user, _) = auth.register(&email, PASSWORD, None).await.expect("register");
    let agency = create_agency(&pool).await;
    let other_agency = create_agency(&pool).await;
    let role = rbac.get_role_by_name("agent").await.expect("seeded role");

    let granted = rbac
        .assign_role(user.id, role.id, agency, user.id, None)
        .await
        .expect("assign");
    assert!(granted.is_some());

    assert!(rbac.has_role(user.id, agency, "agent").await.unwrap());
    // Tenant isolation: the grant does not leak into another agency.
    assert!(!rbac.has_role(user.id, other_agency, "agent").await.unwrap());

    // A live duplicate grant is a no-op.
    let dup = rbac
        .assign_role(user.id, role.id, agency, user.id, None)
        .await
        .unwrap();
    assert!(dup.is_none());

    assert!(rbac.revoke_role(user.id, role.id, agency).await.unwrap());
    assert!(!rbac.has_role(user.id, agency, "agent").await.unwrap());
    // Revoking again reports nothing removed.
    assert!(!rbac.revoke_role(user.id, role.id, agency).await.unwrap());
}

#[tokio::test]
async fn expired_assignment_does_not_block_a_fresh_grant() {
    let Some(pool) = connect().await else { return };
    let (auth, rbac) = services(&pool);
    let email = unique_email();
    let (user, _) = auth.register(&email, PASSWORD, None).await.expect("register");
    let agency = create_agency(&pool).await;
    let role = rbac.get_role_by_name("agent").await.expect("seeded role");

    let lapsed = Utc::now() - Duration::hours(1);
    rbac.assign_role(user.id, role.id, agency, user.id, Some(lapsed))
        .await
        .expect("grant")
        .expect("row inserted");
    assert!(
        rbac.get_user_roles(user.id, agency).await.unwrap().is_empty(),
        "lapsed grant must not be effective"
    );

    // Re-granting over the lapsed row must take effect, not silently no-op.
    let regrant = rbac
        .assign_role(user.id, role.id, agency, user.id, None)
        .await
        .expect("re-grant");
    assert!(regrant.is_some(), "lapsed grant must be replaced");
    assert_eq!(
        rbac.get_user_roles(user.id, agency).await.unwrap(),
        vec!["agent".to_string()]
    );
}
