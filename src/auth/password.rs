//! Password hashing
//!
//! Argon2id hashes stored as PHC strings
//! (`$argon2id$v=19$m=..,t=..,p=..$<salt>$<hash>`). Verification reads the
//! cost parameters from the stored string, so changing the configured cost
//! does not lock out existing accounts.

use argon2::password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

const SALT_LEN: usize = 16;
const OUTPUT_LEN: usize = 32;

const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
const DEFAULT_ITERATIONS: u32 = 1;
const DEFAULT_PARALLELISM: u32 = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Malformed password hash")]
    Malformed,

    #[error("Unsupported password hash scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// Argon2id cost settings used for new hashes
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        let parallelism = parallelism.max(1);
        Self {
            memory_kib: memory_kib.max(Params::MIN_M_COST).max(8 * parallelism),
            iterations: iterations.max(1),
            parallelism,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(OUTPUT_LEN),
        )
        .map_err(|e| PasswordError::Hash(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| PasswordError::Hash(e.to_string()))?;

        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Check a password against a stored PHC string
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(encoded).map_err(|_| PasswordError::Malformed)?;

        if parsed.algorithm.as_str().parse::<Algorithm>().is_err() {
            return Err(PasswordError::UnsupportedScheme(parsed.algorithm.to_string()));
        }

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(_) => Err(PasswordError::Malformed),
        }
    }
}
