//! Demo server binary.
//!
//! Subcommands:
//!
//! - `lifespan-demo server` serves `GET /` on `127.0.0.1:8080`.
//! - `lifespan-demo config` prints the effective config.
//!
//! Running the binary without a subcommand prints usage and exits with a
//! failure code. `--config <file>` and `--config-override <json>` are merged
//! over the built-in defaults, e.g. `lifespan-demo --config-override
//! '{"bindings":{"application_service":"one"}}' server`.

use std::process::ExitCode;

use lifespan::App;
use lifespan_base::{Config, RunMainExt as _, TracingConfig};
use lifespan_demo::{BindingsPlugin, HomeRouter};
use lifespan_http::{AddRouterExt as _, HttpServerConfig, HttpServerPlugin};

fn default_config() -> Config {
    Config::new()
        .with(
            "http_server",
            HttpServerConfig {
                addr: ([127, 0, 0, 1], 8080).into(),
            },
        )
        .with(
            "tracing",
            TracingConfig {
                level: tracing::Level::INFO,
                directives: Vec::new(),
            },
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut app = App::builder();
    app.add_plugin(HttpServerPlugin)
        .add_plugin(BindingsPlugin)
        .add_router::<HomeRouter>();
    // A --config file, when given, is merged on top of the defaults.
    app.add_component(default_config());
    app.run_main().await
}
