//! Router module - Handles routing logic.
//!
//! Routes are matched on the exact path first, then on the method, so a
//! known path requested with the wrong method answers `405` instead of
//! `404`. Handler errors and handler panics are both turned into response
//! envelopes here; nothing below this layer writes HTTP responses.

use crate::errors::AppError;
use crate::metrics;
use crate::request::ClientInfo;
use crate::response::{ApiResponse, ApiResult};
use futures::FutureExt;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

type BoxedHandler<S> = Arc<
    dyn Fn(Request<Body>, Arc<S>) -> Pin<Box<dyn Future<Output = ApiResult<ApiResponse>> + Send>>
        + Send
        + Sync,
>;

/// Represents a route with method, path and handler.
pub struct Route<S> {
    method: Method,
    path: String,
    name: String,
    handler: BoxedHandler<S>,
}

impl<S: Send + Sync + 'static> Route<S> {
    /// Create a new route.
    pub fn new<F, Fut>(method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Body>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<ApiResponse>> + Send + 'static,
    {
        Self {
            method,
            path: path.to_string(),
            name: view_name(path),
            handler: Arc::new(move |req, state| Box::pin(handler(req, state))),
        }
    }

    pub fn get<F, Fut>(path: &str, handler: F) -> Self
    where
        F: Fn(Request<Body>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<ApiResponse>> + Send + 'static,
    {
        Self::new(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(path: &str, handler: F) -> Self
    where
        F: Fn(Request<Body>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<ApiResponse>> + Send + 'static,
    {
        Self::new(Method::POST, path, handler)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Last non-empty path segment, used as the view name in logs and metrics.
fn view_name(path: &str) -> String {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("root")
        .to_string()
}

/// Router that holds all routes, keyed by path.
pub struct Router<S> {
    routes: HashMap<String, Vec<Route<S>>>,
    state: Arc<S>,
}

impl<S: Send + Sync + 'static> Router<S> {
    /// Create a new router over shared handler state.
    pub fn new(state: Arc<S>) -> Self {
        Self {
            routes: HashMap::new(),
            state,
        }
    }

    /// Add a route to the router.
    pub fn add_route(&mut self, route: Route<S>) {
        self.routes
            .entry(route.path.clone())
            .or_insert_with(Vec::new)
            .push(route);
    }

    /// Builder-style [`Router::add_route`].
    pub fn route(mut self, route: Route<S>) -> Self {
        self.add_route(route);
        self
    }

    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    /// Handle an incoming request.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let routes = match self.routes.get(req.uri().path()) {
            Some(routes) => routes,
            None => return ApiResponse::failure(StatusCode::NOT_FOUND, "Not Found").into(),
        };

        let route = match routes.iter().find(|r| r.method == req.method()) {
            Some(route) => route,
            None => {
                let allowed = routes
                    .iter()
                    .map(|r| r.method.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let err = AppError::MethodNotAllowed {
                    method: req.method().to_string(),
                    allowed,
                };
                return ApiResponse::from(err).into();
            }
        };

        let client = ClientInfo::from_request(&req);
        let started = Instant::now();

        let outcome = AssertUnwindSafe((route.handler)(req, self.state.clone()))
            .catch_unwind()
            .await;

        let envelope = match outcome {
            Ok(Ok(resp)) => resp,
            Ok(Err(err)) => {
                if err.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(
                        route = %route.name,
                        client = %client.addr_display(),
                        user_agent = %client.user_agent,
                        "request failed: {}",
                        err
                    );
                } else {
                    tracing::debug!(route = %route.name, "request rejected: {}", err);
                }
                ApiResponse::from(err)
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(
                    route = %route.name,
                    client = %client.addr_display(),
                    user_agent = %client.user_agent,
                    "handler panicked: {}",
                    detail
                );
                ApiResponse::from(AppError::Internal(detail))
            }
        };

        metrics::record_response(&route.name, envelope.code, started.elapsed().as_secs_f64());
        envelope.into()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
