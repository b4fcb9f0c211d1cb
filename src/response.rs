//! Response module - the `{code, message, obj}` envelope every endpoint returns.

use crate::errors::AppError;
use hyper::{header::CONTENT_TYPE, Body, Response as HyperResponse, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type returned by handlers and services.
pub type ApiResult<T> = Result<T, AppError>;

/// Response envelope. `code` reuses HTTP status numbers as domain codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: u16,
    pub message: String,
    pub obj: Option<Value>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, message: impl Into<String>, obj: Option<Value>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            obj,
        }
    }

    /// Success envelope carrying `obj`.
    pub fn success<T: Serialize>(obj: T) -> Self {
        match serde_json::to_value(obj) {
            Ok(value) => Self::new(StatusCode::OK, "Success", Some(value)),
            Err(e) => AppError::Internal(format!("serialize response: {}", e)).into(),
        }
    }

    /// Success envelope with a null `obj`.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK, "Success", None)
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, message, None)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::OK.as_u16()
    }
}

impl From<AppError> for ApiResponse {
    fn from(err: AppError) -> Self {
        ApiResponse::failure(err.status_code(), err.public_message())
    }
}

impl From<ApiResponse> for HyperResponse<Body> {
    fn from(resp: ApiResponse) -> Self {
        let status = resp.status();
        let json = serde_json::to_string(&resp).unwrap_or_else(|_| {
            r#"{"code":500,"message":"Internal Server Error","obj":null}"#.to_string()
        });
        let mut out = HyperResponse::new(Body::from(json));
        *out.status_mut() = status;
        out.headers_mut()
            .insert(CONTENT_TYPE, hyper::header::HeaderValue::from_static("application/json"));
        out
    }
}
