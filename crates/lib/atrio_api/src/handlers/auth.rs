//! Authentication request handlers.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;

use atrio_core::auth::AuthError;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthContext;
use crate::models::{
    AccessTokenResponse, LoginRequest, LogoutRequest, MessageResponse, PasswordResetConfirm,
    PasswordResetRequest, RefreshRequest, RegisterRequest, TokenResponse, UserResponse,
    VerifyEmailRequest,
};

/// `POST /auth/register` — create a new user account.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<TokenResponse>> {
    let (user, pair) = state
        .auth
        .register(&body.email, &body.password, body.display_name.as_deref())
        .await?;
    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer",
        user: UserResponse::from(&user),
    }))
}

/// `POST /auth/login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let (user, pair) = state
        .auth
        .login(&body.email, &body.password, body.device_info)
        .await?;
    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer",
        user: UserResponse::from(&user),
    }))
}

/// `POST /auth/refresh` — exchange a refresh token for a new access token.
/// The refresh token is returned unchanged; it is not rotated.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<AccessTokenResponse>> {
    let access_token = state.auth.refresh_access_token(&body.refresh_token).await?;
    Ok(Json(AccessTokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

/// `POST /auth/logout` — revoke one refresh token. Idempotent: the response
/// is the same whether or not the token matched anything.
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<LogoutRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.logout(&body.refresh_token).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// `POST /auth/logout-all` — revoke every refresh token the caller owns and
/// blacklist the access token presented with this request.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.logout_all_devices(ctx.user_id).await?;
    let remaining = ctx.claims.remaining_secs(Utc::now());
    state.auth.revoke_access_token(&ctx.claims.jti, remaining).await?;
    Ok(Json(MessageResponse::new("Logged out of all devices")))
}

/// `GET /auth/me` — the caller's user snapshot.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .auth
        .get_user_snapshot(ctx.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;
    Ok(Json(UserResponse::from(user)))
}

/// `POST /auth/password-reset/request` — issue a reset token for the email.
///
/// Unknown emails get the same response as known ones; the distinction only
/// exists server-side.
pub async fn password_reset_request_handler(
    State(state): State<AppState>,
    Json(body): Json<PasswordResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    match state.auth.request_password_reset(&body.email).await {
        Ok(_) | Err(AuthError::UserNotFound) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(Json(MessageResponse::new(
        "If an account with this email exists, a reset link has been sent",
    )))
}

/// `POST /auth/password-reset/confirm` — set a new password with a reset
/// token. Revokes every refresh token the account holds.
pub async fn password_reset_confirm_handler(
    State(state): State<AppState>,
    Json(body): Json<PasswordResetConfirm>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.reset_password(&body.token, &body.new_password).await?;
    Ok(Json(MessageResponse::new(
        "Password has been reset, please log in again",
    )))
}

/// `POST /auth/verify-email/request` — issue a fresh verification token for
/// the caller.
pub async fn verify_email_request_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.request_email_verification(ctx.user_id).await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}

/// `POST /auth/verify-email/confirm` — consume a verification token.
pub async fn verify_email_confirm_handler(
    State(state): State<AppState>,
    Json(body): Json<VerifyEmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.verify_email(&body.token).await?;
    Ok(Json(MessageResponse::new("Email verified")))
}
