//! Password hashing and verification using Argon2id
//!
//! New hashes are always Argon2id at the configured target parameters:
//! - Memory: 64 MB
//! - Iterations: 3
//! - Parallelism: 4 threads
//! - Output: 32 bytes hash
//!
//! Hashes at older parameters and legacy bcrypt hashes still verify and are
//! reported by [`PasswordHasher::needs_upgrade`], so a successful login can
//! persist a fresh hash.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Stored password hash is corrupt or unsupported")]
    HashCorrupt,

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),
}

/// Argon2 target parameters
///
/// Increasing memory or iterations improves security but slows down hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (threads, default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// Hashes new passwords and verifies stored ones
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    config: PasswordConfig,
    params: Params,
    /// Target-parameter hash verified when there is no usable stored hash
    dummy_hash: String,
}

impl PasswordHasher {
    /// Build a hasher; computes one hash at the target parameters up front
    pub fn new(config: PasswordConfig) -> Result<Self, PasswordError> {
        let params = config.to_params()?;
        let mut hasher = Self {
            config,
            params,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash("scribe-unusable-credential")?;
        Ok(hasher)
    }

    pub fn config(&self) -> &PasswordConfig {
        &self.config
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash a plaintext password into a PHC string
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Verify, keeping "corrupt hash" apart from "wrong password"
    ///
    /// Argon2 hashes are checked with the parameters embedded in the hash, not
    /// the current target.
    ///
    /// A corrupt hash costs the same Argon2 verification as a wrong password.
    pub fn verify_detailed(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        if is_bcrypt(hash) {
            return bcrypt::verify(password, hash).map_err(|_| {
                self.verify_absent(password);
                PasswordError::HashCorrupt
            });
        }

        let Ok(parsed) = PasswordHash::new(hash) else {
            self.verify_absent(password);
            return Err(PasswordError::HashCorrupt);
        };
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
        }
    }

    /// Spend one target-parameter verification for an account with no usable
    /// hash (unknown, inactive or corrupt), so failures all take as long
    pub fn verify_absent(&self, password: &str) {
        if let Ok(parsed) = PasswordHash::new(&self.dummy_hash) {
            let _ = self.argon2().verify_password(password.as_bytes(), &parsed);
        }
    }

    /// Verify a password; any failure to verify reads as a mismatch
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match self.verify_detailed(password, hash) {
            Ok(matched) => matched,
            Err(e) => {
                debug!(error = %e, "Password verification failed");
                false
            }
        }
    }

    /// Whether `hash` differs from the current target algorithm or parameters
    pub fn needs_upgrade(&self, hash: &str) -> bool {
        if is_bcrypt(hash) {
            return true;
        }

        let Ok(parsed) = PasswordHash::new(hash) else {
            return true;
        };
        if parsed.algorithm != argon2::Algorithm::Argon2id.ident() {
            return true;
        }
        if parsed.version != Some(Version::V0x13.into()) {
            return true;
        }
        let Ok(current) = Params::try_from(&parsed) else {
            return true;
        };

        let target = &self.params;
        current.m_cost() != target.m_cost()
            || current.t_cost() != target.t_cost()
            || current.p_cost() != target.p_cost()
            || current.output_len().unwrap_or(Params::DEFAULT_OUTPUT_LEN)
                != target.output_len().unwrap_or(Params::DEFAULT_OUTPUT_LEN)
    }

    /// Verify and, on a match against an outdated hash, produce a fresh one
    ///
    /// Never re-hashes on a mismatch. A re-hash failure still reports the match.
    pub fn verify_and_upgrade(&self, password: &str, hash: &str) -> (bool, Option<String>) {
        if !self.verify(password, hash) {
            return (false, None);
        }
        if !self.needs_upgrade(hash) {
            return (true, None);
        }

        match self.hash(password) {
            Ok(new_hash) => (true, Some(new_hash)),
            Err(e) => {
                tracing::warn!(error = %e, "Password re-hash failed, keeping stored hash");
                (true, None)
            }
        }
    }
}

fn is_bcrypt(hash: &str) -> bool {
    hash.starts_with("$2a$") || hash.starts_with("$2b$") || hash.starts_with("$2y$")
}

/// Validate password strength
///
/// Checks if a password meets minimum security requirements:
/// - At least 8 characters
/// - At least 1 letter
/// - At least 1 digit
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}
