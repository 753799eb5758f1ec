//! # lifespan
//!
//! Dependency injection with two service lifetimes:
//!
//! - **Singleton**: a [`Service`] built once while the [`App`] is built and
//!   shared by everyone for the life of the process.
//! - **PerRequest**: a [`ScopedService`] built on first use inside a
//!   [`Scope`], shared for the rest of that scope and released when the
//!   scope closes.
//!
//! A capability is identified by the handle type it is resolved as, e.g.
//! `Arc<dyn Storage>`. Exactly one implementation can be bound to a
//! capability; registering a second one panics.
//!
//! ```rust
//! use lifespan::{
//!     AddScopedServiceExt as _, AddServiceExt as _, App, AppBuilder, Release, Scope,
//!     ScopedService, Service, StdError,
//! };
//! use std::sync::Arc;
//!
//! struct Database;
//!
//! impl Service for Database {
//!     type Handle = Arc<Self>;
//!
//!     async fn build(_app: &AppBuilder) -> Result<Self::Handle, StdError> {
//!         Ok(Arc::new(Self))
//!     }
//! }
//!
//! struct Transaction {
//!     database: Arc<Database>,
//! }
//!
//! impl Release for Transaction {
//!     fn release(&self) {
//!         println!("rollback");
//!     }
//! }
//!
//! impl ScopedService for Transaction {
//!     type Handle = Arc<Self>;
//!
//!     async fn build(scope: &Scope) -> Result<Self::Handle, StdError> {
//!         let database = scope.resolve::<Arc<Database>>().await?;
//!         Ok(Arc::new(Self { database }))
//!     }
//!
//!     fn release(handle: &Self::Handle) {
//!         Release::release(&**handle);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Arc::new(
//!         App::builder()
//!             .add_service::<Database>()
//!             .add_scoped_service::<Transaction>()
//!             .build()
//!             .await?,
//!     );
//!     let scope = Scope::new(app.clone());
//!     let transaction = scope.resolve::<Arc<Transaction>>().await?;
//!     let database = app.get_component::<Arc<Database>>().unwrap();
//!     assert!(Arc::ptr_eq(&transaction.database, &database));
//!     // Prints "rollback".
//!     scope.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `macros` (default): `#[derive(ScopedService)]`.

mod app;
mod scope;
mod service;

pub use app::*;
pub use scope::*;
pub use service::*;

#[cfg(feature = "macros")]
pub use lifespan_macros::*;
