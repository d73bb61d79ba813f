//! Argon2id password hashing.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier,
};
use rand::rngs::OsRng;

/// Password hashing collaborator. Implementations are CPU bound; callers run
/// them on the blocking pool.
pub trait PasswordHasher: Send + Sync {
    /// # Errors
    /// Returns an error if the hash cannot be produced.
    fn hash(&self, plain: &str) -> Result<String>;

    /// `false` for a wrong password and for an unparsable hash.
    fn verify(&self, plain: &str, hash: &str) -> bool;
}

#[derive(Clone, Debug, Default)]
pub struct Argon2PasswordHasher;

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|_| anyhow!("failed to hash password"))?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, plain: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hasher = Argon2PasswordHasher;
        let hash = hasher.hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("battery staple", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!Argon2PasswordHasher.verify("anything", "not-a-phc-string"));
    }
}
