//! Crate-wide error taxonomy.
//!
//! Every layer has its own `thiserror` enum; they are folded into [`AppError`]
//! here, and `AppError` is turned into a response envelope in exactly one
//! place (`impl From<AppError> for ApiResponse`).

use crate::auth::jwt::JwtError;
use crate::auth::password::PasswordError;
use crate::database::DatabaseError;
use crate::email::EmailError;
use crate::upload::UploadError;
use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// No token (or other required credential) was supplied.
    #[error("no jwt token")]
    MissingCredential,

    /// Signature mismatch, malformed token, expired token or stale principal.
    #[error("invalid jwt token")]
    InvalidToken,

    /// The principal lacks the producer extension.
    #[error("producer authority required")]
    InsufficientRole,

    /// Missing resource, or a resource not owned by the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    NotAcceptable(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Method {method} not allowed, {allowed} only")]
    MethodNotAllowed { method: String, allowed: String },

    /// Object storage or mail delivery failed.
    #[error("{action} failed: {detail}")]
    Upstream { action: &'static str, detail: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingCredential | AppError::InsufficientRole => StatusCode::UNAUTHORIZED,
            AppError::InvalidToken | AppError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Upstream { .. } | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand to the client. Upstream and internal details
    /// stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Upstream { action, .. } => format!("{} failed", action),
            AppError::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        AppError::NotAcceptable(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(what) => AppError::Conflict(what),
            DatabaseError::NotFound => AppError::NotFound("record"),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::TokenCreationError(detail) => AppError::Internal(detail),
            _ => AppError::InvalidToken,
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Weak(_) => AppError::not_acceptable("Password check failed"),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::InvalidAddress(_) => AppError::bad_request("Illegal Email Format"),
            other => AppError::Upstream {
                action: "send email",
                detail: other.to_string(),
            },
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidFileType(_) => AppError::not_acceptable("invalid file extension"),
            UploadError::MissingFile(field) => {
                AppError::not_acceptable(format!("no {} file found", field))
            }
            UploadError::Multipart(e) => AppError::bad_request(format!("malformed form data: {}", e)),
            UploadError::FileTooLarge(_) => AppError::bad_request("file too large"),
            other => AppError::Upstream {
                action: "upload file",
                detail: other.to_string(),
            },
        }
    }
}
