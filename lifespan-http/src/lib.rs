//! HTTP serving for lifespan applications.
//!
//! [`HttpServerPlugin`] runs an axum server as a daemon. Every request gets
//! its own [`Scope`](lifespan::Scope), opened by [`RequestScopeLayer`] and
//! closed once the response is produced, and handlers pull request-scoped
//! capabilities out of it with the [`Scoped`] extractor.

mod router;
mod scope;
mod trace;

pub use router::*;
pub use scope::*;

pub use axum;

pub use axum::Json;
pub use axum::Router;
pub use axum::extract::Request;
pub use axum::response::Response;
pub use axum::routing;
