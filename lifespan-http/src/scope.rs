use std::any::Any;
use std::mem::replace;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use lifespan::{App, ResolveError, Scope, StdError};
use lifespan_base::defer;
use serde::Serialize;
use tower::{Layer, Service};

use crate::{Request, Response};

/// The [`Scope`] of the request being handled, stored in the request
/// extensions by [`RequestScopeLayer`].
#[derive(Clone)]
pub struct RequestScope(Arc<Scope>);

impl RequestScope {
    pub fn scope(&self) -> &Scope {
        &self.0
    }
}

/// Opens a [`Scope`] for every request and closes it once the inner service
/// has produced a response.
///
/// The scope is also closed when the inner future panics or is dropped
/// before completion.
#[derive(Clone)]
pub struct RequestScopeLayer {
    app: Arc<App>,
}

impl RequestScopeLayer {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

impl<S> Layer<S> for RequestScopeLayer {
    type Service = RequestScopeMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestScopeMiddleware {
            app: self.app.clone(),
            inner,
        }
    }
}

#[derive(Clone)]
pub struct RequestScopeMiddleware<S> {
    app: Arc<App>,
    inner: S,
}

impl<S> RequestScopeMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + Clone + 'static,
{
    async fn request(
        app: Arc<App>,
        mut request: Request,
        mut inner: S,
    ) -> Result<S::Response, S::Error> {
        tracing::info!("Request started");
        let scope = Arc::new(Scope::new(app));
        request
            .extensions_mut()
            .insert(RequestScope(scope.clone()));
        defer! {
            scope.close();
            tracing::info!("Request ended");
        };
        inner.call(request).await
    }
}

impl<S> Service<Request> for RequestScopeMiddleware<S>
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
        Box::pin(Self::request(self.app.clone(), request, inner))
    }
}

/// Extractor resolving the capability `H` from the request's [`Scope`].
///
/// ```rust
/// use lifespan_http::{Json, Scoped};
/// use std::sync::Arc;
///
/// struct Session {
///     user: String,
/// }
///
/// async fn whoami(Scoped(session): Scoped<Arc<Session>>) -> Json<String> {
///     Json(session.user.clone())
/// }
/// ```
pub struct Scoped<H>(pub H);

impl<S, H> FromRequestParts<S> for Scoped<H>
where
    S: Send + Sync,
    H: Clone + Send + Sync + 'static,
{
    type Rejection = ScopeRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let scope = parts
            .extensions
            .get::<RequestScope>()
            .cloned()
            .ok_or(ScopeRejection::MissingScope)?;
        Ok(Self(scope.scope().resolve::<H>().await?))
    }
}

/// Rejection of [`Scoped`], rendered as `500` with a JSON body.
#[derive(Debug)]
pub enum ScopeRejection {
    /// The request did not pass through [`RequestScopeLayer`].
    MissingScope,
    Resolve(ResolveError),
}

impl ScopeRejection {
    pub fn kind(&self) -> &'static str {
        match self {
            ScopeRejection::MissingScope => "lifecycle",
            ScopeRejection::Resolve(err) => err.kind(),
        }
    }
}

impl std::fmt::Display for ScopeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeRejection::MissingScope => f.write_str("Request scope is missing"),
            ScopeRejection::Resolve(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ScopeRejection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScopeRejection::MissingScope => None,
            ScopeRejection::Resolve(err) => Some(err),
        }
    }
}

impl From<ResolveError> for ScopeRejection {
    fn from(err: ResolveError) -> Self {
        ScopeRejection::Resolve(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl IntoResponse for ScopeRejection {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        };
        let error: StdError = Box::new(self);
        let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        response.extensions_mut().insert(Arc::new(error));
        response
    }
}

/// Renders a panicking handler as `500` with the same JSON body as
/// [`ScopeRejection`].
pub(crate) fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "Handler panicked".to_string(),
        },
    };
    tracing::error!(panic = %message, "Handler panicked");
    let body = ErrorBody {
        kind: "panic",
        message,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
