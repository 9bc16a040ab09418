//! Access token codec: signed, time-bounded JWTs (HS256).
//!
//! [`verify_access_token`] is the authoritative path for protected-route
//! entry: signature + expiry + blacklist. [`decode_access_token_unverified`]
//! exists only to pre-populate request context opportunistically and is never
//! authorization proof.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use super::{AuthError, Result};
use crate::cache::AuthCache;
use crate::models::auth::AccessClaims;

/// Access token lifetime: 30 minutes.
pub const ACCESS_TOKEN_EXPIRY_SECS: i64 = 30 * 60;

/// Generate a signed JWT access token (HS256, 30 min expiry) with a unique
/// jti for later blacklisting.
pub fn issue_access_token(
    user_id: Uuid,
    email: &str,
    extra_claims: HashMap<String, serde_json::Value>,
    secret: &[u8],
) -> Result<String> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: (now + Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS)).timestamp(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
        typ: "access".to_string(),
        extra: extra_claims,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
}

/// Decode and validate signature + expiry, without the blacklist check.
fn decode_checked(token: &str, secret: &[u8]) -> Result<AccessClaims> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let claims = decode::<AccessClaims>(token, &key, &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(format!("jwt decode: {e}")),
        })?
        .claims;
    if claims.typ != "access" {
        return Err(AuthError::InvalidToken(format!(
            "unexpected token type '{}'",
            claims.typ
        )));
    }
    Ok(claims)
}

/// Verify an access token: signature, expiry, type, and the revocation
/// blacklist.
///
/// The blacklist is the only defense against a compromised
/// still-valid-by-expiry token being reused after logout, so a cache outage
/// here fails the request instead of silently granting access.
pub async fn verify_access_token(
    token: &str,
    secret: &[u8],
    cache: &AuthCache,
) -> Result<AccessClaims> {
    let claims = decode_checked(token, secret)?;
    match cache.is_token_blacklisted(&claims.jti).await {
        Ok(true) => Err(AuthError::InvalidToken("Token has been revoked".into())),
        Ok(false) => Ok(claims),
        Err(e) => Err(AuthError::CacheUnavailable(e.to_string())),
    }
}

/// Decode without signature or expiry validation.
pub fn decode_access_token_unverified(token: &str) -> Result<AccessClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(format!("jwt decode: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use super::*;
    use crate::cache::MemoryCache;

    const SECRET: &[u8] = b"test-secret";

    fn cache() -> AuthCache {
        AuthCache::new(Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn issue_then_verify_roundtrip() {
        let user_id = Uuid::new_v4();
        let token =
            issue_access_token(user_id, "a@x.com", HashMap::new(), SECRET).unwrap();
        let claims = verify_access_token(&token, SECRET, &cache()).await.unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.typ, "access");
        assert_eq!(claims.user_id(), Some(user_id));
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn extra_claims_survive_the_roundtrip() {
        let mut extra = HashMap::new();
        extra.insert("agency".to_string(), serde_json::json!("main"));
        let token = issue_access_token(Uuid::new_v4(), "a@x.com", extra, SECRET).unwrap();
        let claims = verify_access_token(&token, SECRET, &cache()).await.unwrap();
        assert_eq!(claims.extra.get("agency"), Some(&serde_json::json!("main")));
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let token =
            issue_access_token(Uuid::new_v4(), "a@x.com", HashMap::new(), SECRET).unwrap();
        let err = verify_access_token(&token, b"other", &cache()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        let err = verify_access_token("not.a.jwt", SECRET, &cache()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn blacklisted_jti_is_rejected() {
        let cache = cache();
        let token =
            issue_access_token(Uuid::new_v4(), "a@x.com", HashMap::new(), SECRET).unwrap();
        let claims = verify_access_token(&token, SECRET, &cache).await.unwrap();

        cache
            .blacklist_token(&claims.jti, StdDuration::from_secs(60))
            .await
            .unwrap();

        let err = verify_access_token(&token, SECRET, &cache).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn unverified_decode_reads_claims_without_secret() {
        let user_id = Uuid::new_v4();
        let token =
            issue_access_token(user_id, "a@x.com", HashMap::new(), SECRET).unwrap();
        let claims = decode_access_token_unverified(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn two_tokens_get_distinct_jtis() {
        let a = issue_access_token(Uuid::new_v4(), "a@x.com", HashMap::new(), SECRET).unwrap();
        let b = issue_access_token(Uuid::new_v4(), "a@x.com", HashMap::new(), SECRET).unwrap();
        let ca = decode_access_token_unverified(&a).unwrap();
        let cb = decode_access_token_unverified(&b).unwrap();
        assert_ne!(ca.jti, cb.jti);
    }
}
