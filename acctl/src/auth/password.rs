//! Password hashing and verification.

use crate::errors::Error;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Turns a raw password into an opaque digest. Implementations may fail and are called from a
/// blocking thread.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, Error>;
}

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    /// Create Argon2 instance with these parameters.
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| {
            Error::CredentialProcessingFailed {
                reason: format!("create argon2 params: {e}"),
            }
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Argon2id hasher with a fresh random salt per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher {
    params: Argon2Params,
}

impl Argon2Hasher {
    pub fn new(params: Argon2Params) -> Self {
        Self { params }
    }

    /// Verify a password against a digest. Verification uses the parameters embedded in the digest.
    pub fn verify(password: &str, digest: &str) -> Result<bool, Error> {
        let parsed = PasswordHash::new(digest).map_err(|e| Error::CredentialProcessingFailed {
            reason: format!("parse hash: {e}"),
        })?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = self.params.to_argon2()?;

        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::CredentialProcessingFailed {
                reason: format!("hash password: {e}"),
            })?;

        Ok(hash.to_string())
    }
}
