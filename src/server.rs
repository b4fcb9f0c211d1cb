//! Server module - Main server implementation.
//!
//! `MelodiaServer` ties the router and the global middleware stack to a
//! hyper listener, and answers `/health` and `/metrics` itself.

use crate::metrics;
use crate::middleware::{Middleware, MiddlewareStack};
use crate::request::RemoteAddr;
use crate::router::Router;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Main server struct.
pub struct MelodiaServer<S> {
    router: Router<S>,
    middleware: MiddlewareStack,
}

impl<S: Send + Sync + 'static> MelodiaServer<S> {
    /// Create a new server.
    pub fn new(router: Router<S>) -> Self {
        Self {
            router,
            middleware: MiddlewareStack::new(),
        }
    }

    /// Add middleware.
    pub fn with_middleware(mut self, middleware: Box<dyn Middleware>) -> Self {
        self.middleware.add(middleware);
        self
    }

    /// Serve one request without a socket. Used by `run` and by tests.
    pub async fn dispatch(&self, req: Request<Body>) -> Response<Body> {
        metrics::REQUEST_COUNTER.inc();

        if req.method() == Method::GET {
            match req.uri().path() {
                "/health" => return plain(StatusCode::OK, "text/plain", "ok".to_string()),
                "/metrics" => {
                    return plain(
                        StatusCode::OK,
                        "text/plain; version=0.0.4",
                        metrics::gather_metrics(),
                    )
                }
                _ => {}
            }
        }

        match self.middleware.before(req).await {
            Ok(req) => {
                let resp = self.router.handle(req).await;
                self.middleware.after(resp).await
            }
            Err(resp) => resp,
        }
    }

    /// Run the server until ctrl-c.
    pub async fn run(self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = addr.parse()?;
        let server = Arc::new(self);

        let make_svc = make_service_fn(move |conn: &AddrStream| {
            let server = server.clone();
            let remote = conn.remote_addr();
            async move {
                Ok::<_, Infallible>(service_fn(move |mut req: Request<Body>| {
                    let server = server.clone();
                    async move {
                        req.extensions_mut().insert(RemoteAddr(remote));
                        Ok::<_, Infallible>(server.dispatch(req).await)
                    }
                }))
            }
        });

        tracing::info!("Melodia listening on http://{}", addr);
        Server::try_bind(&addr)?
            .serve(make_svc)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install ctrl-c handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn plain(status: StatusCode, content_type: &'static str, body: String) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}
