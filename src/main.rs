//! Melodia server binary.

use melodia::email::{Mailer, OutboxMailer, SmtpMailer};
use melodia::upload::LocalObjectStore;
use melodia::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    observability::init_tracing(&config.logging.level);

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Database: {}", config.database.url);
    tracing::info!("Token validity: {} hours", config.auth.token_validity_hours);

    let repos = Repositories::connect(&config.database.url).await?;

    let mailer: Arc<dyn Mailer> = if config.email.smtp_host.is_empty() {
        tracing::warn!("No SMTP host configured, captcha mails stay in the in-memory outbox");
        Arc::new(OutboxMailer::new())
    } else {
        Arc::new(SmtpMailer::new(&config.email)?)
    };
    let store = Arc::new(LocalObjectStore::new(
        config.storage.upload_dir.clone(),
        config.storage.public_base_url.clone(),
    ));

    let state = Arc::new(AppState::build(
        &config,
        repos,
        mailer,
        store,
        Arc::new(SystemClock),
    )?);

    let server = MelodiaServer::new(routes(state))
        .with_middleware(Box::new(LoggingMiddleware))
        .with_middleware(Box::new(ContentLengthLimit::new(config.server.max_body_bytes)));

    server.run(&config.server_addr()).await
}
