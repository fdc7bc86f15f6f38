//! Argon2id password hashing in PHC string format.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use once_cell::sync::Lazy;
use rand::{RngCore, rngs::OsRng};
use thiserror::Error;

// Hashed once with the same parameters as real accounts.
static DECOY_HASH: Lazy<Option<String>> = Lazy::new(|| hash("agora-decoy-credential").ok());

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to generate salt: {0}")]
    Salt(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// # Errors
/// Returns an error if salt generation or hashing fails.
pub fn hash(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| PasswordError::Salt(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt).map_err(|e| PasswordError::Salt(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// `false` for a wrong password and for an unparsable stored hash.
#[must_use]
pub fn verify(password: &str, phc: &str) -> bool {
    PasswordHash::new(phc).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Full verification against a throwaway hash, used when no account matches
/// so the lookup miss costs as much as a wrong password. Always `false`.
#[must_use]
pub fn verify_decoy(password: &str) -> bool {
    if let Some(phc) = DECOY_HASH.as_deref() {
        let _ = verify(password, phc);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let phc = hash("correct horse").expect("hash");
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify("correct horse", &phc));
        assert!(!verify("battery staple", &phc));
    }

    #[test]
    fn salts_differ() {
        let a = hash("same").expect("hash");
        let b = hash("same").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify("anything", "not-a-phc-string"));
    }

    #[test]
    fn decoy_is_a_real_hash_and_never_verifies() {
        let decoy = DECOY_HASH.as_deref().expect("decoy hash");
        assert!(decoy.starts_with("$argon2id$"));
        assert!(PasswordHash::new(decoy).is_ok());
        assert!(!verify_decoy("agora-decoy-credential"));
        assert!(!verify_decoy(""));
    }
}
