//! Middleware module - Support for before/after request processing.
//!
//! This module provides middleware traits and stacks for processing requests and responses.

use crate::errors::AppError;
use crate::response::ApiResponse;
use hyper::header::CONTENT_LENGTH;
use hyper::{Body, Request, Response};
use std::future::Future;
use std::pin::Pin;

/// Type alias for middleware results
pub type MiddlewareResult<T> = Result<T, Response<Body>>;

/// Trait for middleware.
pub trait Middleware: Send + Sync {
    /// Process before the request is handled.
    /// Return Ok(req) to continue, or Err(response) to short-circuit.
    fn before(
        &self,
        req: Request<Body>,
    ) -> Pin<Box<dyn Future<Output = MiddlewareResult<Request<Body>>> + Send + '_>> {
        Box::pin(async move { Ok(req) })
    }

    /// Process after the response is generated.
    fn after(
        &self,
        resp: Response<Body>,
    ) -> Pin<Box<dyn Future<Output = Response<Body>> + Send + '_>> {
        Box::pin(async move { resp })
    }
}

/// Stack of middleware.
#[derive(Default)]
pub struct MiddlewareStack {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl MiddlewareStack {
    /// Create a new middleware stack.
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Add middleware to the stack.
    pub fn add(&mut self, middleware: Box<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Apply before middleware.
    pub async fn before(&self, mut req: Request<Body>) -> MiddlewareResult<Request<Body>> {
        for middleware in &self.middlewares {
            req = middleware.before(req).await?;
        }
        Ok(req)
    }

    /// Apply after middleware, innermost first.
    pub async fn after(&self, mut resp: Response<Body>) -> Response<Body> {
        for middleware in self.middlewares.iter().rev() {
            resp = middleware.after(resp).await;
        }
        resp
    }
}

/// Logs every request line and every response status.
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(
        &self,
        req: Request<Body>,
    ) -> Pin<Box<dyn Future<Output = MiddlewareResult<Request<Body>>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(method = %req.method(), path = %req.uri().path(), "request");
            Ok(req)
        })
    }

    fn after(
        &self,
        resp: Response<Body>,
    ) -> Pin<Box<dyn Future<Output = Response<Body>> + Send + '_>> {
        Box::pin(async move {
            tracing::debug!(status = resp.status().as_u16(), "response");
            resp
        })
    }
}

/// Rejects requests whose declared `Content-Length` exceeds `max_bytes`
/// before any of the body is read. Chunked bodies are bounded later, while
/// parameters are parsed.
pub struct ContentLengthLimit {
    max_bytes: usize,
}

impl ContentLengthLimit {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Middleware for ContentLengthLimit {
    fn before(
        &self,
        req: Request<Body>,
    ) -> Pin<Box<dyn Future<Output = MiddlewareResult<Request<Body>>> + Send + '_>> {
        let max_bytes = self.max_bytes;
        Box::pin(async move {
            let declared = req
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<usize>().ok());
            match declared {
                Some(len) if len > max_bytes => {
                    tracing::warn!(len, max_bytes, path = %req.uri().path(), "request body too large");
                    Err(ApiResponse::from(AppError::bad_request("file too large")).into())
                }
                _ => Ok(req),
            }
        })
    }
}
