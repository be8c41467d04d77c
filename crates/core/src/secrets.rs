use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret hashing failed: {0}")]
    Hash(String),
    #[error("stored secret hash is malformed: {0}")]
    MalformedHash(String),
}

/// One-way, salted secret hashing. Hashes can be verified but never reversed.
pub trait SecretHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, SecretError>;

    /// Returns `Ok(false)` on a mismatch; errors are reserved for hashes that
    /// cannot be parsed at all.
    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, SecretError>;
}

/// Argon2id with a random salt per hash, stored in PHC string format.
#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, SecretError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|error| SecretError::Hash(error.to_string()))
    }

    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, SecretError> {
        let parsed =
            PasswordHash::new(hash).map_err(|error| SecretError::MalformedHash(error.to_string()))?;
        Ok(self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok())
    }
}
