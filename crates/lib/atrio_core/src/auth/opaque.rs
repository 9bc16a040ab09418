//! Opaque token utilities: generation with a lookup prefix, fast hashing,
//! and constant-time candidate verification.
//!
//! Opaque tokens (refresh, password reset, email verification) are
//! high-entropy random strings, so storage uses a fast deterministic SHA-256
//! digest rather than a slow password hash — deterministic digests are what
//! make indexed lookup possible at all.

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Opaque token length in characters.
pub const OPAQUE_TOKEN_LEN: usize = 64;

/// Length of the non-secret lookup prefix stored in the clear.
pub const TOKEN_PREFIX_LEN: usize = 8;

/// A freshly issued opaque token. `raw` is handed to the client exactly once
/// and never stored; `prefix` is the clear DB index column.
#[derive(Debug, Clone)]
pub struct OpaqueToken {
    pub raw: String,
    pub prefix: String,
}

/// Generate a cryptographically random opaque token (64 alphanumeric chars)
/// together with its lookup prefix.
pub fn issue_opaque_token() -> OpaqueToken {
    let raw: String = rng()
        .sample_iter(&Alphanumeric)
        .take(OPAQUE_TOKEN_LEN)
        .map(char::from)
        .collect();
    let prefix = raw[..TOKEN_PREFIX_LEN].to_string();
    OpaqueToken { raw, prefix }
}

/// Extract the lookup prefix from a candidate raw token.
pub fn token_prefix(raw: &str) -> &str {
    if raw.len() >= TOKEN_PREFIX_LEN {
        &raw[..TOKEN_PREFIX_LEN]
    } else {
        raw
    }
}

/// SHA-256 hash an opaque token for storage.
pub fn hash_opaque_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Verify a candidate raw token against a stored digest in constant time.
pub fn verify_opaque_token(raw: &str, stored_hash: &str) -> bool {
    let candidate = hash_opaque_token(raw);
    candidate.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_has_expected_shape() {
        let token = issue_opaque_token();
        assert_eq!(token.raw.len(), OPAQUE_TOKEN_LEN);
        assert_eq!(token.prefix.len(), TOKEN_PREFIX_LEN);
        assert!(token.raw.starts_with(&token.prefix));
        assert!(token.raw.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hash_is_deterministic_and_not_the_raw_value() {
        let token = issue_opaque_token();
        let h1 = hash_opaque_token(&token.raw);
        let h2 = hash_opaque_token(&token.raw);
        assert_eq!(h1, h2);
        assert_ne!(h1, token.raw);
        assert_eq!(h1.len(), 64); // hex sha256
    }

    #[test]
    fn verify_matches_only_the_original_token() {
        let token = issue_opaque_token();
        let stored = hash_opaque_token(&token.raw);
        assert!(verify_opaque_token(&token.raw, &stored));
        assert!(!verify_opaque_token("somethingelse", &stored));
    }

    #[test]
    fn two_tokens_do_not_collide() {
        let a = issue_opaque_token();
        let b = issue_opaque_token();
        assert_ne!(a.raw, b.raw);
    }

    #[test]
    fn prefix_of_short_input_is_the_input() {
        assert_eq!(token_prefix("abc"), "abc");
        assert_eq!(token_prefix("abcdefghij"), "abcdefgh");
    }
}
