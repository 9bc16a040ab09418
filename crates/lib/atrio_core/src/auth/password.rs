//! Password hashing via bcrypt, plus the strength policy.

use super::{AuthError, Result};

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Maximum accepted password length.
const MAX_PASSWORD_LEN: usize = 128;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// Check the password strength policy: 8–128 chars, at least one uppercase,
/// lowercase, digit, and special character.
pub fn check_password_strength(password: &str) -> Result<()> {
    // Length bounds count characters, not bytes, so multibyte passwords
    // are measured the way users count them.
    let char_len = password.chars().count();
    if char_len < 8 {
        return Err(AuthError::Validation(
            "Password must be at least 8 characters long".into(),
        ));
    }
    if char_len > MAX_PASSWORD_LEN {
        return Err(AuthError::Validation(
            "Password must be less than 128 characters".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AuthError::Validation(
            "Password must contain at least one uppercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AuthError::Validation(
            "Password must contain at least one lowercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::Validation(
            "Password must contain at least one digit".into(),
        ));
    }
    const SPECIAL: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";
    if !password.chars().any(|c| SPECIAL.contains(c)) {
        return Err(AuthError::Validation(
            "Password must contain at least one special character".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hash = hash_password("Str0ng!Pass").unwrap();
        assert_ne!(hash, "Str0ng!Pass");
        assert!(verify_password("Str0ng!Pass", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn strength_policy_accepts_valid_password() {
        assert!(check_password_strength("Str0ng!Pass").is_ok());
    }

    #[test]
    fn strength_policy_rejects_violations() {
        for weak in [
            "Sh0rt!a",        // too short
            "alllower1!",     // no uppercase
            "ALLUPPER1!",     // no lowercase
            "NoDigits!!",     // no digit
            "NoSpecial11",    // no special
        ] {
            assert!(check_password_strength(weak).is_err(), "accepted: {weak}");
        }
        let too_long = format!("Aa1!{}", "x".repeat(130));
        assert!(check_password_strength(&too_long).is_err());
    }

    #[test]
    fn length_bounds_count_characters_not_bytes() {
        // 7 characters but 8 bytes: still too short.
        assert!(check_password_strength("Äa1!bcd").is_err());
        // 9 characters, 10 bytes: within bounds.
        assert!(check_password_strength("Pässw0rd!").is_ok());
        // 128 characters with a multibyte lead: exactly at the cap.
        let at_cap = format!("ÄA1!{}", "x".repeat(124));
        assert!(check_password_strength(&at_cap).is_ok());
    }
}
