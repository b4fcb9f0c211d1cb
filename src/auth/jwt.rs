//! JWT token handling and validation.
//!
//! Tokens are HS256-signed and self-contained: `{uid, email, exp}`. Nothing
//! is stored server side; a token dies when `exp` passes.

use crate::auth::models::Principal;
use crate::clock::Clock;
use crate::database::UserRepository;
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// JWT token claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Principal id, string encoded
    pub uid: String,
    pub email: String,
    /// Expiration as a Unix timestamp (seconds)
    pub exp: i64,
}

/// JWT codec configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Lifetime of an issued token
    pub validity: Duration,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>, validity: Duration) -> Self {
        Self {
            secret: secret.into(),
            validity,
        }
    }
}

/// Errors that can occur during JWT operations
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token creation failed: {0}")]
    TokenCreationError(String),

    #[error("Token validation failed: {0}")]
    TokenValidationError(String),

    #[error("Token expired")]
    TokenExpired,
}

/// Issues and verifies session tokens.
pub struct TokenCodec {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: JwtConfig, users: Arc<dyn UserRepository>, clock: Arc<dyn Clock>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
            users,
            clock,
        }
    }

    /// Issue a token for `principal` with the configured validity.
    pub fn issue(&self, principal: &Principal) -> Result<String, JwtError> {
        self.issue_with_validity(principal, self.config.validity)
    }

    pub fn issue_with_validity(
        &self,
        principal: &Principal,
        validity: Duration,
    ) -> Result<String, JwtError> {
        let claims = Claims {
            uid: principal.id.to_string(),
            email: principal.email.clone(),
            exp: (self.clock.now() + validity).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::TokenCreationError(e.to_string()))
    }

    /// Check the signature and expiry and return the embedded claims.
    ///
    /// Expiry is compared against the injected clock rather than the
    /// library's system-time check.
    pub fn decode_claims(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| JwtError::TokenValidationError(e.to_string()))?
            .claims;

        if self.clock.now().timestamp() > claims.exp {
            return Err(JwtError::TokenExpired);
        }
        Ok(claims)
    }

    /// Resolve the principal a token was issued to.
    ///
    /// Fails closed: bad signature, malformed input, expiry, an unknown id or
    /// an email that no longer matches all yield `None`.
    pub async fn verify(&self, token: &str) -> Option<Principal> {
        let claims = match self.decode_claims(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!("Rejected token: {}", e);
                return None;
            }
        };
        let id = Uuid::parse_str(&claims.uid).ok()?;

        match self.users.find_principal(id, &claims.email).await {
            Ok(principal) => principal,
            Err(e) => {
                tracing::warn!("Principal lookup failed during token verification: {}", e);
                None
            }
        }
    }
}
