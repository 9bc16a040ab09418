//! Authentication middleware: Bearer token extraction, verification, and
//! request-context injection.
//!
//! Verification includes the revocation blacklist, and a cache outage on
//! that check rejects the request — the blacklist only works if it is
//! actually consulted.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use atrio_core::auth::AuthError;
use atrio_core::models::auth::AccessClaims;

use crate::AppState;
use crate::error::AppError;

/// Header naming the agency a request operates in.
pub const AGENCY_HEADER: &str = "x-agency-id";

/// Authenticated request context, injected into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub claims: AccessClaims,
    /// Tenant scope from the `X-Agency-Id` header, when present.
    pub agency_id: Option<Uuid>,
}

impl AuthContext {
    /// The agency scope, required. Tenant-scoped routes call this first so a
    /// missing header fails fast instead of resolving against nothing.
    pub fn agency(&self) -> Result<Uuid, AppError> {
        self.agency_id
            .ok_or_else(|| AppError::Validation(format!("Missing {AGENCY_HEADER} header")))
    }
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies the
/// JWT against signature, expiry, and blacklist, and injects [`AuthContext`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let claims = state.auth.verify_access_token(token).await.map_err(|e| match e {
        AuthError::CacheUnavailable(msg) => AppError::Unavailable(msg),
        _ => AppError::Unauthorized("Invalid or expired token".into()),
    })?;

    let user_id = claims
        .user_id()
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    // Malformed agency IDs fail here, before any handler runs.
    let agency_id = match request.headers().get(AGENCY_HEADER) {
        Some(raw) => {
            let s = raw
                .to_str()
                .map_err(|_| AppError::Validation(format!("Invalid {AGENCY_HEADER} header")))?;
            Some(
                Uuid::parse_str(s)
                    .map_err(|_| AppError::Validation(format!("Invalid {AGENCY_HEADER} header")))?,
            )
        }
        None => None,
    };

    request.extensions_mut().insert(AuthContext {
        user_id,
        claims,
        agency_id,
    });

    Ok(next.run(request).await)
}
