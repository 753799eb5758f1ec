use std::mem::replace;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::MatchedPath;
use lifespan::StdError;
use tower::{Layer, Service};
use tracing::Instrument as _;

use crate::{Request, Response};

/// Wraps every request in a `request` span and logs its outcome.
#[derive(Clone, Copy)]
pub(crate) struct TracingLayer;

impl<S> Layer<S> for TracingLayer {
    type Service = TracingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingMiddleware { inner }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct TracingMiddleware<S> {
    inner: S,
}

impl<S> TracingMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + Clone + 'static,
{
    async fn request(request: Request, mut inner: S) -> Result<S::Response, S::Error> {
        let span = tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            route = tracing::field::Empty,
        );
        if let Some(path) = request.extensions().get::<MatchedPath>() {
            span.record("route", path.as_str());
        }
        let now = Instant::now();
        let response = inner.call(request).instrument(span.clone()).await?;
        let latency = now.elapsed().as_micros();
        let status = response.status();
        if let Some(error) = response.extensions().get::<Arc<StdError>>() {
            tracing::error!(parent: &span, error = %error, "Response error");
        }
        if status.is_client_error() {
            tracing::warn!(parent: &span, latency, status = status.as_u16(), "Response");
        } else if status.is_server_error() {
            tracing::error!(parent: &span, latency, status = status.as_u16(), "Response");
        } else {
            tracing::info!(parent: &span, latency, status = status.as_u16(), "Response");
        }
        Ok(response)
    }
}

impl<S> Service<Request> for TracingMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let clone = self.inner.clone();
        let inner = replace(&mut self.inner, clone);
        Box::pin(Self::request(request, inner))
    }
}
