//! # lifespan-base
//!
//! The ambient pieces every lifespan application needs around the
//! container:
//!
//! - **Configuration**: [`Config`], a JSON document split into named
//!   sections, loaded from `--config` and merged with `--config-override`.
//! - **Logging**: [`Tracing`] installs a `tracing-subscriber` registry from
//!   the `tracing` config section.
//! - **Daemons**: long-running tasks such as HTTP servers, stopped through a
//!   shared [`CancellationToken`].
//! - **Commands**: the `server` and `config` subcommands and
//!   [`RunMainExt::run_main`].
//! - **Deferred cleanup**: [`defer!`].
//!
//! ```rust
//! use lifespan::App;
//! use lifespan_base::{Config, ConfigSection};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct StorageConfig {
//!     path: String,
//! }
//!
//! impl ConfigSection for StorageConfig {
//!     fn key() -> &'static str {
//!         "storage"
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let app = App::builder()
//!     .add_component(Config::new().with("storage", StorageConfig { path: "/tmp".into() }))
//!     .build()
//!     .await?;
//! let config = app.get_component_ref::<Config>().unwrap();
//! assert_eq!(config.section::<StorageConfig>()?.path, "/tmp");
//! # Ok(())
//! # }
//! ```

mod command;
mod config;
mod daemon;
mod defer;
mod logging;
pub mod test;

pub use command::*;
pub use config::*;
pub use daemon::*;
pub use defer::*;
pub use logging::*;

pub use async_trait::async_trait;
