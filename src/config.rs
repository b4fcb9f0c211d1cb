//! Configuration module - Environment and file-based configuration management.
//!
//! Sources, lowest priority first: built-in defaults, `config/default` and
//! `config/local` (any format the `config` crate understands), then
//! `MELODIA_*` environment variables (`MELODIA_AUTH__JWT_SECRET=...`).

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Built-in signing secret. Lets tests and local runs start, but
/// [`AppConfig::validate`] refuses it.
pub const PLACEHOLDER_JWT_SECRET: &str = "default-secret-key-change-in-production";

/// Main application configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub captcha: CaptchaConfig,
    pub email: EmailConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a buffered request body, uploads included.
    pub max_body_bytes: usize,
}

/// `url` is `memory` for the in-process store, otherwise a SQLite path
/// (requires the `sqlite` feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Session token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_validity_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    pub length: usize,
    pub validity_minutes: i64,
}

/// Outbound mail. An empty `smtp_host` keeps mail in an in-memory outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: String,
    pub public_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "memory".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: PLACEHOLDER_JWT_SECRET.to_string(),
            token_validity_hours: 2,
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            length: 6,
            validity_minutes: 30,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 465,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_email: "noreply@melodia.local".to_string(),
            from_name: "Melodia".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "./uploads".to_string(),
            public_base_url: "http://127.0.0.1:8000/media".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, optional config files and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if std::path::Path::new(".env").exists() {
            dotenvy::dotenv().ok();
        }

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Self::environment())
            .build()?;
        config.try_deserialize()
    }

    /// Load configuration with custom file path.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;
        config.try_deserialize()
    }

    fn environment() -> Environment {
        Environment::with_prefix("MELODIA")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Get server bind address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth.jwt_secret == PLACEHOLDER_JWT_SECRET {
            return Err("JWT secret must be configured (MELODIA_AUTH__JWT_SECRET)".to_string());
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err("JWT secret must be at least 32 characters long".to_string());
        }

        if self.auth.token_validity_hours <= 0 {
            return Err("Token validity must be positive".to_string());
        }

        if self.captcha.length == 0 || self.captcha.validity_minutes <= 0 {
            return Err("Captcha length and validity must be positive".to_string());
        }

        if self.server.max_body_bytes == 0 {
            return Err("Request body limit must be positive".to_string());
        }

        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        Ok(())
    }
}
