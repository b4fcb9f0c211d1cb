//! The per-request authorization gate.
//!
//! A protected operation walks `token present -> token verified -> principal
//! resolved -> [role checked] -> [ownership checked]`. Each step fails with
//! its own outcome and nothing past a failed step runs.

use crate::auth::jwt::TokenCodec;
use crate::auth::models::{Principal, Producer};
use crate::errors::AppError;
use crate::metrics;
use crate::response::ApiResult;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthGuard {
    codec: Arc<TokenCodec>,
}

impl AuthGuard {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Resolve the caller from an optional token.
    ///
    /// Absent or empty token: `MissingCredential` (401). Anything the codec
    /// rejects: `InvalidToken` (406).
    pub async fn authenticate(&self, token: Option<&str>) -> ApiResult<Principal> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => {
                metrics::record_auth_failure("missing");
                return Err(AppError::MissingCredential);
            }
        };

        match self.codec.verify(token).await {
            Some(principal) => Ok(principal),
            None => {
                metrics::record_auth_failure("invalid");
                Err(AppError::InvalidToken)
            }
        }
    }

    /// Resolve the caller and require the producer extension.
    pub async fn authenticate_producer(
        &self,
        token: Option<&str>,
    ) -> ApiResult<(Principal, Producer)> {
        let principal = self.authenticate(token).await?;
        let producer = require_producer(&principal)?.clone();
        Ok((principal, producer))
    }
}

/// `InsufficientRole` (401) unless the principal is a producer.
pub fn require_producer(principal: &Principal) -> ApiResult<&Producer> {
    match principal.role.producer() {
        Some(producer) => Ok(producer),
        None => {
            metrics::record_auth_failure("role");
            Err(AppError::InsufficientRole)
        }
    }
}

/// Result of an owner-filtered lookup. Missing and not-owned are the same
/// `NotFound(what)`.
pub fn owned<T>(found: Option<T>, what: &'static str) -> ApiResult<T> {
    found.ok_or(AppError::NotFound(what))
}
