//! Email captcha issuance and single-use consumption.

use crate::auth::models::CaptchaRecord;
use crate::clock::Clock;
use crate::database::CaptchaRepository;
use crate::email::{MailTemplates, Mailer};
use crate::errors::AppError;
use crate::response::ApiResult;
use crate::validation::require_email;
use chrono::Duration;
use rand::Rng;
use std::sync::Arc;

const CAPTCHA_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw `length` characters from `A-Z0-9`.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CAPTCHA_CHARSET[rng.gen_range(0..CAPTCHA_CHARSET.len())] as char)
        .collect()
}

pub struct CaptchaService {
    records: Arc<dyn CaptchaRepository>,
    mailer: Arc<dyn Mailer>,
    templates: MailTemplates,
    clock: Arc<dyn Clock>,
    length: usize,
    validity: Duration,
}

impl CaptchaService {
    pub fn new(
        records: Arc<dyn CaptchaRepository>,
        mailer: Arc<dyn Mailer>,
        templates: MailTemplates,
        clock: Arc<dyn Clock>,
        length: usize,
        validity: Duration,
    ) -> Self {
        Self {
            records,
            mailer,
            templates,
            clock,
            length,
            validity,
        }
    }

    /// Create (or replace) the captcha for `email` and mail it.
    pub async fn issue(&self, email: &str) -> ApiResult<()> {
        require_email(email)?;

        let code = generate_code(self.length);
        self.records
            .upsert_captcha(CaptchaRecord {
                email: email.to_string(),
                code: code.clone(),
                expires_at: self.clock.now() + self.validity,
            })
            .await?;

        let body = self
            .templates
            .render_captcha(&code, self.validity.num_minutes())?;
        self.mailer
            .send(email, &self.templates.captcha_subject(), &body)
            .await?;

        tracing::info!("Captcha issued for {}", email);
        Ok(())
    }

    /// Consume the live captcha for `email` if `code` matches it.
    pub async fn consume(&self, email: &str, code: &str) -> ApiResult<()> {
        if self.records.take_captcha(email, code, self.clock.now()).await? {
            Ok(())
        } else {
            Err(AppError::not_acceptable("Captcha check failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::MemoryStore;
    use crate::email::OutboxMailer;
    use chrono::Utc;
    use regex::Regex;

    struct Fixture {
        service: CaptchaService,
        store: Arc<MemoryStore>,
        outbox: Arc<OutboxMailer>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(OutboxMailer::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = CaptchaService::new(
            store.clone(),
            outbox.clone(),
            MailTemplates::new("Melodia").unwrap(),
            clock.clone(),
            6,
            Duration::minutes(30),
        );
        Fixture {
            service,
            store,
            outbox,
            clock,
        }
    }

    async fn mailed_code(outbox: &OutboxMailer, email: &str) -> String {
        let mail = outbox.last_to(email).await.unwrap();
        let re = Regex::new(r"<strong>([A-Z0-9]{6})</strong>").unwrap();
        re.captures(&mail.body).unwrap()[1].to_string()
    }

    #[test]
    fn test_generate_code_alphabet() {
        let code = generate_code(6);
        assert_eq!(code.len(), 6);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_issue_then_consume_once() {
        let f = fixture();
        f.service.issue("a@x.com").await.unwrap();
        let code = mailed_code(&f.outbox, "a@x.com").await;

        f.service.consume("a@x.com", &code).await.unwrap();
        let err = f.service.consume("a@x.com", &code).await.unwrap_err();
        assert_eq!(err.public_message(), "Captcha check failed");
    }

    #[tokio::test]
    async fn test_code_bound_to_email() {
        let f = fixture();
        let expires_at = f.clock.now() + Duration::minutes(30);
        for (email, code) in [("a@x.com", "AAAAAA"), ("b@x.com", "BBBBBB")] {
            f.store
                .upsert_captcha(CaptchaRecord {
                    email: email.into(),
                    code: code.into(),
                    expires_at,
                })
                .await
                .unwrap();
        }

        assert!(f.service.consume("b@x.com", "AAAAAA").await.is_err());
        assert!(f.service.consume("c@x.com", "AAAAAA").await.is_err());
        f.service.consume("a@x.com", "AAAAAA").await.unwrap();
        f.service.consume("b@x.com", "BBBBBB").await.unwrap();
    }

    #[tokio::test]
    async fn test_reissue_replaces_previous_code() {
        let f = fixture();
        f.service.issue("a@x.com").await.unwrap();
        let first = mailed_code(&f.outbox, "a@x.com").await;
        f.service.issue("a@x.com").await.unwrap();
        let second = mailed_code(&f.outbox, "a@x.com").await;

        if first != second {
            assert!(f.service.consume("a@x.com", &first).await.is_err());
        }
        f.service.consume("a@x.com", &second).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let f = fixture();
        f.service.issue("a@x.com").await.unwrap();
        let code = mailed_code(&f.outbox, "a@x.com").await;

        f.clock.advance(Duration::minutes(31));
        assert!(f.service.consume("a@x.com", &code).await.is_err());
    }

    #[tokio::test]
    async fn test_bad_email_rejected_without_mail() {
        let f = fixture();
        let err = f.service.issue("not-an-email").await.unwrap_err();
        assert_eq!(err.public_message(), "Illegal Email Format");
        assert!(f.outbox.sent().await.is_empty());
    }
}
