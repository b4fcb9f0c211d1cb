//! Melodia: authentication and authorization backend for a music platform.
//! Core library entry point. Re-exports main modules for developer ergonomics.

pub mod auth;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod database;
pub mod email;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod upload;
pub mod validation;

// Re-export commonly used types for convenience
pub use auth::{AuthGuard, Principal, Producer, Role, TokenCodec};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use database::Repositories;
pub use errors::AppError;
pub use handlers::{routes, AppState};
pub use middleware::{ContentLengthLimit, LoggingMiddleware, Middleware};
pub use request::Params;
pub use response::{ApiResponse, ApiResult};
pub use router::{Route, Router};
pub use server::MelodiaServer;
