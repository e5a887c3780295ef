//! Request-context middleware.
//!
//! Captures endpoint, host, and method into a task-local so audit events can
//! be stamped with them from anywhere below the handler, adopts the incoming
//! OpenTelemetry trace context, and emits one audit line per completed
//! request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::response::Response;
use opentelemetry::propagation::Extractor;
use tower::{Layer, Service};
use tracing::{Instrument, span};

use tracing_opentelemetry::OpenTelemetrySpanExt;

tokio::task_local! {
    pub static REQUEST_CONTEXT: RequestContext;
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub endpoint: String,
    pub host: String,
    pub method: String,
}

/// Run `f` against the current request context, or an empty one when called
/// outside a request scope (startup, tests).
pub fn with_request_info<F, R>(f: F) -> R
where
    F: Fn(&RequestContext) -> R,
{
    REQUEST_CONTEXT.try_with(|ctx| f(ctx)).unwrap_or_else(|_| {
        static FALLBACK: RequestContext = RequestContext {
            endpoint: String::new(),
            host: String::new(),
            method: String::new(),
        };
        f(&FALLBACK)
    })
}

struct HeaderCarrier<'a>(&'a HeaderMap);

impl Extractor for HeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

fn requested_host(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}

#[derive(Debug, Clone, Default)]
pub struct RequestContextLayer;

impl RequestContextLayer {
    pub fn new() -> Self {
        RequestContextLayer
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContextService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestContextService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    // Instrumenting changes the future's concrete type, so it gets boxed.
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let parent_context = opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.extract(&HeaderCarrier(req.headers()))
        });

        let ctx = RequestContext {
            endpoint: req.uri().path().to_string(),
            host: requested_host(req.headers()),
            method: req.method().to_string(),
        };

        let request_span = span!(
            tracing::Level::INFO,
            "request",
            endpoint = %ctx.endpoint,
            method = %ctx.method,
        );
        request_span.set_parent(parent_context);

        let fut = self.inner.call(req);
        Box::pin(async move {
            REQUEST_CONTEXT
                .scope(ctx, async move {
                    let response = fut.instrument(request_span).await;

                    if let Ok(res) = &response {
                        let status = res.status().as_u16();
                        crate::audit!(status = %status, "request finished");
                    }

                    response
                })
                .await
        })
    }
}
