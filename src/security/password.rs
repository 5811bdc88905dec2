//! Password hashing and verification utilities.
//!
//! Account passwords go through a [`CredentialBackend`] so the core never
//! handles hash formats itself. Operator passwords from configuration use
//! the bcrypt-or-plaintext convention of oper blocks.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

/// Hashes and checks account passwords.
pub trait CredentialBackend: Send + Sync {
    /// Produce the stored form of `password`.
    fn hash(&self, password: &str) -> Result<String, argon2::password_hash::Error>;

    /// Check `password` against a stored form produced by [`hash`](Self::hash).
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// Argon2 with default parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Backend;

impl CredentialBackend for Argon2Backend {
    fn hash(&self, password: &str) -> Result<String, argon2::password_hash::Error> {
        hash_password(password)
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(hash) => verify_password(password, &hash).unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Verify a password against a stored Argon2 hash.
pub fn verify_password(
    password: &str,
    hash: &PasswordHash<'_>,
) -> Result<bool, argon2::password_hash::Error> {
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), hash)
        .is_ok())
}

/// Hash a password using default Argon2 settings.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    Ok(argon2
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Verify an operator password (plaintext or bcrypt).
pub fn verify_oper_password(stored: &str, password: &str) -> bool {
    if stored.starts_with("$2") {
        bcrypt::verify(password, stored).unwrap_or(false)
    } else {
        stored == password
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_round_trip() {
        let backend = Argon2Backend;
        let stored = backend.hash("hunter2").unwrap();
        assert!(stored.starts_with("$argon2"));
        assert!(backend.verify("hunter2", &stored));
        assert!(!backend.verify("hunter3", &stored));
    }

    #[test]
    fn argon2_rejects_garbage_hash() {
        assert!(!Argon2Backend.verify("x", "not-a-hash"));
    }

    #[test]
    fn oper_password_plain_and_bcrypt() {
        assert!(verify_oper_password("secret", "secret"));
        assert!(!verify_oper_password("secret", "Secret"));

        let hashed = bcrypt::hash("secret", 4).unwrap();
        assert!(verify_oper_password(&hashed, "secret"));
        assert!(!verify_oper_password(&hashed, "wrong"));
    }
}
