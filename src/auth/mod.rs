//! Authentication and Authorization module.
//!
//! - signed session tokens (`jwt`)
//! - password hashing (`password`)
//! - email captchas (`captcha`)
//! - the per-request guard (`guard`)
//! - account operations built on the above (`service`)

pub mod captcha;
pub mod guard;
pub mod jwt;
pub mod models;
pub mod password;
pub mod service;

// Re-export commonly used types
pub use captcha::CaptchaService;
pub use guard::{owned, require_producer, AuthGuard};
pub use jwt::{Claims, JwtConfig, TokenCodec};
pub use models::{Principal, Producer, Role};
pub use password::PasswordService;
pub use service::{AccountService, PasswordChange, Registration};
