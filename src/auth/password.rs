//! Password hashing and verification utilities.
//!
//! Credentials are stored as salted Argon2 hashes in PHC string format and
//! never compared in plain text.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

/// Minimum number of characters in an acceptable password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Errors that can occur during password operations
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingError(String),

    #[error("Password verification failed: {0}")]
    VerificationError(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,

    #[error("Weak password: {0}")]
    Weak(String),
}

/// Service for password hashing and verification
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    /// Create a new password service with default configuration
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashingError(e.to_string()))?;

        Ok(password_hash.to_string())
    }

    /// Verify a password against a hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

        match self
            .argon2
            .verify_password(password.as_bytes(), &parsed_hash)
        {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::VerificationError(e.to_string())),
        }
    }

    /// Validate password strength: ASCII letters and digits only, at least
    /// eight of them, with at least one letter and one digit.
    pub fn validate_password_strength(&self, password: &str) -> Result<(), PasswordError> {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(PasswordError::Weak(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            )));
        }

        if !password.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PasswordError::Weak(
                "Password may only contain letters and digits".to_string(),
            ));
        }

        if !password.chars().any(|c| c.is_ascii_alphabetic()) {
            return Err(PasswordError::Weak(
                "Password must contain at least one letter".to_string(),
            ));
        }

        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(PasswordError::Weak(
                "Password must contain at least one number".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PasswordService {
    fn default() -> Self {
        Self::new()
    }
}
