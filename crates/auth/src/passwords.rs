//! Password hashing and generation.

use gort_domain::{Error, Result};
use rand::Rng;

/// Length of a generated bootstrap password.
pub const GENERATED_PASSWORD_LEN: usize = 32;

const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Hash a password with bcrypt at the default cost.
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| Error::Other(format!("password hash failed: {e}")))
}

/// Verify a password against a stored bcrypt digest. The comparison
/// inside bcrypt is constant time; a malformed digest verifies false.
pub fn verify_password(stored_hash: &str, supplied_password: &str) -> bool {
    bcrypt::verify(supplied_password, stored_hash).unwrap_or(false)
}

/// A random 32-character password, used when bootstrap is invoked with a
/// blank one.
pub fn generate_password() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_PASSWORD_LEN)
        .map(|_| {
            let idx = rng.random_range(0..PASSWORD_ALPHABET.len());
            PASSWORD_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip() {
        let hash = hash_password("s3cret").unwrap();
        assert_ne!(hash, "s3cret");
        assert!(verify_password(&hash, "s3cret"));
        assert!(!verify_password(&hash, "other"));
    }

    #[test]
    fn malformed_digest_verifies_false() {
        assert!(!verify_password("not-a-bcrypt-digest", "whatever"));
    }

    #[test]
    fn generated_passwords_are_long_and_distinct() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.len(), GENERATED_PASSWORD_LEN);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
