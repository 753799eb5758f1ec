//! Command-line entry point.
//!
//! Subcommands are registered on the [`AppBuilder`] like any other
//! component. [`RunMainExt::run_main`] parses the command line, assembles
//! the [`Config`], installs logging, builds the app and hands it to the
//! selected subcommand.

use std::any::TypeId;
use std::collections::HashMap;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::mem::take;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Arg, ArgAction, ArgMatches};
use lifespan::{App, AppBuilder, StdError};

use crate::{CancellationToken, Config, RunDaemonsExt as _, Tracing};

/// CLI subcommand with access to the built app.
pub trait Command: Send + Sync {
    fn command() -> clap::Command
    where
        Self: Sized;

    fn main(app: Arc<App>, matches: ArgMatches) -> impl Future<Output = ExitCode> + Send;
}

#[async_trait]
trait DynCommand: Send + Sync {
    fn command(&self) -> clap::Command;

    async fn main(&self, app: Arc<App>, matches: ArgMatches) -> ExitCode;
}

struct CommandWrapper<T>(PhantomData<fn() -> T>);

#[async_trait]
impl<T> DynCommand for CommandWrapper<T>
where
    T: Command + 'static,
{
    fn command(&self) -> clap::Command {
        T::command()
    }

    async fn main(&self, app: Arc<App>, matches: ArgMatches) -> ExitCode {
        T::main(app, matches).await
    }
}

#[derive(Default)]
#[doc(hidden)]
pub struct CommandRegistry {
    commands: HashMap<TypeId, Box<dyn DynCommand>>,
}

impl CommandRegistry {
    pub fn add_command<T>(&mut self)
    where
        T: Command + 'static,
    {
        self.commands.insert(
            TypeId::of::<T>(),
            Box::new(CommandWrapper::<T>(PhantomData)),
        );
    }

    pub fn has_command<T>(&self) -> bool
    where
        T: Command + 'static,
    {
        self.commands.contains_key(&TypeId::of::<T>())
    }

    pub fn build_cli(&self) -> clap::Command {
        let mut cli = clap::Command::default()
            .subcommand_required(true)
            .arg(
                Arg::new("config")
                    .long("config")
                    .short('c')
                    .help("Path to the JSON config file"),
            )
            .arg(
                Arg::new("config-override")
                    .long("config-override")
                    .short('o')
                    .action(ArgAction::Append)
                    .help("JSON config merged on top of the main one"),
            );
        let mut subcommands: Vec<_> = self.commands.values().map(|v| v.command()).collect();
        subcommands.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        for subcommand in subcommands {
            cli = cli.subcommand(subcommand);
        }
        cli
    }

    pub async fn run_main(&self, app: Arc<App>, mut matches: ArgMatches) -> ExitCode {
        let Some((name, matches)) = matches.remove_subcommand() else {
            return ExitCode::FAILURE;
        };
        match self
            .commands
            .values()
            .find(|v| v.command().get_name() == name)
        {
            Some(command) => command.main(app, matches).await,
            None => ExitCode::FAILURE,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

pub trait AddCommandExt {
    fn add_command<T>(&mut self) -> &mut Self
    where
        T: Command + 'static;

    fn has_command<T>(&self) -> bool
    where
        T: Command + 'static;
}

impl AddCommandExt for AppBuilder {
    fn add_command<T>(&mut self) -> &mut Self
    where
        T: Command + 'static,
    {
        match self.get_component_mut::<CommandRegistry>() {
            Some(registry) => registry.add_command::<T>(),
            None => {
                let mut registry = CommandRegistry::default();
                registry.add_command::<T>();
                self.add_component(registry);
            }
        }
        self
    }

    fn has_command<T>(&self) -> bool
    where
        T: Command + 'static,
    {
        self.get_component_ref::<CommandRegistry>()
            .is_some_and(|v| v.has_command::<T>())
    }
}

pub trait RunMainExt {
    /// Runs the CLI with the process arguments.
    fn run_main(&mut self) -> impl Future<Output = ExitCode> + Send;

    /// Runs the CLI with explicit arguments; the first one is the binary
    /// name.
    fn run_main_from<I, T>(&mut self, args: I) -> impl Future<Output = ExitCode> + Send
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<OsString> + Clone;
}

impl RunMainExt for AppBuilder {
    async fn run_main(&mut self) -> ExitCode {
        self.run_main_from(std::env::args_os().collect::<Vec<_>>())
            .await
    }

    async fn run_main_from<I, T>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<OsString> + Clone,
    {
        if !self.has_command::<ServerCommand>() {
            self.add_command::<ServerCommand>();
        }
        if !self.has_command::<ConfigCommand>() {
            self.add_command::<ConfigCommand>();
        }
        let Some(registry) = self.get_component_mut::<CommandRegistry>().map(take) else {
            return ExitCode::FAILURE;
        };
        let matches = match registry.build_cli().try_get_matches_from(args) {
            Ok(v) => v,
            Err(err) => {
                let _ = err.print();
                return if err.use_stderr() {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                };
            }
        };
        if let Err(err) = setup_config(self, &matches).await {
            eprintln!("Cannot load config: {err}");
            return ExitCode::FAILURE;
        }
        if let Err(err) = Tracing::build(self) {
            eprintln!("Cannot setup tracing: {err}");
            return ExitCode::FAILURE;
        }
        let app = match self.build().await {
            Ok(v) => Arc::new(v),
            Err(err) => {
                tracing::error!(error = %err, "Cannot build app");
                return ExitCode::FAILURE;
            }
        };
        registry.run_main(app, matches).await
    }
}

/// Loads `--config` and every `--config-override` on top of the config
/// component already present, if any.
async fn setup_config(app: &mut AppBuilder, matches: &ArgMatches) -> Result<(), StdError> {
    let mut config = Config::new();
    if let Some(path) = matches.get_one::<String>("config") {
        config.merge_from(Config::parse_file(path).await?);
    }
    for path in matches
        .get_many::<String>("config-override")
        .unwrap_or_default()
    {
        config.merge_from(Config::parse_file(path).await?);
    }
    match app.get_component_mut::<Config>() {
        Some(base) => base.merge_from(config),
        None => {
            app.add_component(config);
        }
    }
    Ok(())
}

/// Runs every registered daemon until Ctrl-C.
pub struct ServerCommand;

impl Command for ServerCommand {
    fn command() -> clap::Command {
        clap::Command::new("server").about("Runs the application server")
    }

    async fn main(app: Arc<App>, _matches: ArgMatches) -> ExitCode {
        let shutdown = CancellationToken::new();
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "Cannot listen for Ctrl-C");
                }
                shutdown.cancel();
            }
        });
        match app.run_daemons(shutdown).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!(error = %err, "Server failed");
                ExitCode::FAILURE
            }
        }
    }
}

/// Prints the merged configuration as JSON.
pub struct ConfigCommand;

impl Command for ConfigCommand {
    fn command() -> clap::Command {
        clap::Command::new("config").about("Prints the effective configuration")
    }

    async fn main(app: Arc<App>, _matches: ArgMatches) -> ExitCode {
        match app.get_component_ref::<Config>().map(Config::to_json_pretty) {
            Some(Ok(text)) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            _ => ExitCode::FAILURE,
        }
    }
}
