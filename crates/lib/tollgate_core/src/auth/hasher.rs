//! Refresh-secret hashing via bcrypt.
//!
//! Secrets are reduced to a hex SHA-256 digest first: bcrypt only reads the
//! first 72 bytes of its input and refresh tokens are longer than that.

use sha2::{Digest, Sha256};

use super::AuthError;

/// bcrypt cost factor.
pub const BCRYPT_COST: u32 = 10;

/// Salted, adaptive-cost hashing of refresh secrets.
#[derive(Debug, Clone, Copy)]
pub struct SecretHasher {
    cost: u32,
}

impl SecretHasher {
    /// Hasher with a fixed cost factor. bcrypt accepts 4..=31.
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a secret. Every call draws a fresh salt.
    pub fn hash(&self, secret: &str) -> Result<String, AuthError> {
        bcrypt::hash(digest(secret), self.cost)
            .map_err(|e| AuthError::Crypto(format!("bcrypt hash: {e}")))
    }

    /// Verify a secret against a stored hash.
    pub fn verify(&self, hash: &str, secret: &str) -> Result<bool, AuthError> {
        bcrypt::verify(digest(secret), hash)
            .map_err(|e| AuthError::Crypto(format!("bcrypt verify: {e}")))
    }
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self::new(BCRYPT_COST)
    }
}

fn digest(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}
