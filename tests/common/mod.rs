#![allow(dead_code)]

use chrono::Utc;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request, StatusCode};
use melodia::email::OutboxMailer;
use melodia::upload::LocalObjectStore;
use melodia::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tempfile::TempDir;

static CAPTCHA_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<strong>([A-Z0-9]{6})</strong>").unwrap());

pub const PASSWORD: &str = "melody2024";
const BOUNDARY: &str = "melodia-test-boundary";

/// A fully wired service driven in-process, with a controllable clock and
/// an inspectable outbox.
pub struct TestApp {
    pub server: MelodiaServer<AppState>,
    pub outbox: Arc<OutboxMailer>,
    pub clock: Arc<ManualClock>,
    _media: TempDir,
}

/// A file part for multipart requests.
pub struct Part<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub data: &'a [u8],
}

impl TestApp {
    pub fn new() -> Self {
        let media = TempDir::new().unwrap();
        let outbox = Arc::new(OutboxMailer::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let config = AppConfig::default();
        let state = AppState::build(
            &config,
            Repositories::memory(),
            outbox.clone(),
            Arc::new(LocalObjectStore::new(media.path(), "http://media.test")),
            clock.clone(),
        )
        .unwrap();

        let server = MelodiaServer::new(routes(Arc::new(state)))
            .with_middleware(Box::new(LoggingMiddleware))
            .with_middleware(Box::new(ContentLengthLimit::new(
                config.server.max_body_bytes,
            )));

        Self {
            server,
            outbox,
            clock,
            _media: media,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, ApiResponse) {
        let resp = self.server.dispatch(req).await;
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        let envelope: ApiResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status.as_u16(), envelope.code, "status line mirrors code");
        (status, envelope)
    }

    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> ApiResponse {
        let uri = format!("{}?{}", path, encode(params));
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(req).await.1
    }

    pub async fn post(&self, path: &str, params: &[(&str, &str)]) -> ApiResponse {
        let req = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(encode(params)))
            .unwrap();
        self.send(req).await.1
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        params: &[(&str, &str)],
        files: &[Part<'_>],
    ) -> ApiResponse {
        let mut body = Vec::new();
        for (name, value) in params {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        for part in files {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, part.field, part.filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let req = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(req).await.1
    }

    /// Request a captcha for `email` and read it back from the outbox.
    pub async fn captcha_for(&self, email: &str) -> String {
        let resp = self
            .get("/api/generateCaptcha/", &[("user_email", email)])
            .await;
        assert_eq!(resp.code, 200, "{}", resp.message);

        let mail = self.outbox.last_to(email).await.expect("captcha mail");
        CAPTCHA_CODE
            .captures(&mail.body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .expect("code in mail body")
    }

    /// Register a listener and return the session token.
    pub async fn register(&self, username: &str, email: &str) -> String {
        let captcha = self.captcha_for(email).await;
        let resp = self
            .post(
                "/api/userRegister/",
                &[
                    ("user_name", username),
                    ("user_email", email),
                    ("user_password", PASSWORD),
                    ("captcha", &captcha),
                ],
            )
            .await;
        assert_eq!(resp.code, 200, "{}", resp.message);
        token_of(&resp)
    }

    /// Register a user, upgrade it to producer and return (token, producer id).
    pub async fn register_producer(&self, username: &str, email: &str) -> (String, String) {
        let token = self.register(username, email).await;
        let resp = self
            .post(
                "/api/applyProducer/",
                &[("encode_jwt", &token), ("ptype", "band"), ("title", username)],
            )
            .await;
        assert_eq!(resp.code, 200, "{}", resp.message);
        (token, id_of(&resp))
    }
}

pub fn encode(params: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

pub fn token_of(resp: &ApiResponse) -> String {
    resp.obj
        .as_ref()
        .and_then(|v| v.as_str())
        .expect("token string")
        .to_string()
}

pub fn id_of(resp: &ApiResponse) -> String {
    resp.obj
        .as_ref()
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("id field")
        .to_string()
}
