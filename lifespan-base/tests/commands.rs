use clap::{Arg, ArgMatches, Command as ClapCommand};
use lifespan::{App, StdError};
use lifespan_base::{
    AddCommandExt, AddDaemonExt, CancellationToken, Command, CommandRegistry, Config,
    ConfigCommand, Daemon, RunMainExt, ServerCommand,
};
use serde_json::json;
use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;

struct EchoCommand;

impl Command for EchoCommand {
    fn command() -> ClapCommand {
        ClapCommand::new("echo")
            .about("Succeeds when --text is given")
            .arg(Arg::new("text").long("text"))
    }

    async fn main(_app: Arc<App>, matches: ArgMatches) -> ExitCode {
        match matches.get_one::<String>("text") {
            Some(_) => ExitCode::SUCCESS,
            None => ExitCode::FAILURE,
        }
    }
}

/// Succeeds when the merged config has `greeting.text == "hello"` and
/// `greeting.volume == 11`.
struct CheckGreetingCommand;

impl Command for CheckGreetingCommand {
    fn command() -> ClapCommand {
        ClapCommand::new("check-greeting")
    }

    async fn main(app: Arc<App>, _matches: ArgMatches) -> ExitCode {
        let Some(config) = app.get_component_ref::<Config>() else {
            return ExitCode::FAILURE;
        };
        match config.get::<serde_json::Value>("greeting") {
            Ok(value) if value == json!({"text": "hello", "volume": 11}) => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    }
}

static ONESHOT_RUNS: AtomicUsize = AtomicUsize::new(0);

struct OneshotDaemon;

impl Daemon for OneshotDaemon {
    async fn run(&self, _app: Arc<App>, _shutdown: CancellationToken) -> Result<(), StdError> {
        ONESHOT_RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_command_registry_build_cli() {
    let mut registry = CommandRegistry::default();
    assert!(registry.is_empty());
    registry.add_command::<EchoCommand>();
    registry.add_command::<ConfigCommand>();
    assert_eq!(registry.len(), 2);
    assert!(registry.has_command::<EchoCommand>());
    assert!(!registry.has_command::<ServerCommand>());

    let cli = registry.build_cli();
    let subcommands: Vec<_> = cli.get_subcommands().map(|v| v.get_name()).collect();
    assert_eq!(subcommands, vec!["config", "echo"]);
    assert!(cli.is_subcommand_required_set());
    assert!(cli.get_arguments().any(|v| v.get_id() == "config"));
    assert!(cli.get_arguments().any(|v| v.get_id() == "config-override"));
}

#[tokio::test]
async fn test_add_command_ext() {
    let mut builder = App::builder();
    assert!(!builder.has_command::<EchoCommand>());
    builder.add_command::<EchoCommand>().add_command::<EchoCommand>();
    assert!(builder.has_command::<EchoCommand>());
    assert_eq!(
        builder.get_component_ref::<CommandRegistry>().unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_run_main_dispatches_subcommand() {
    let mut builder = App::builder();
    builder.add_command::<EchoCommand>();
    assert_eq!(
        builder.run_main_from(["app", "echo", "--text", "hi"]).await,
        ExitCode::SUCCESS
    );

    let mut builder = App::builder();
    builder.add_command::<EchoCommand>();
    assert_eq!(
        builder.run_main_from(["app", "echo"]).await,
        ExitCode::FAILURE
    );
}

#[tokio::test]
async fn test_run_main_rejects_bad_arguments() {
    let mut builder = App::builder();
    assert_eq!(builder.run_main_from(["app"]).await, ExitCode::FAILURE);

    let mut builder = App::builder();
    assert_eq!(
        builder.run_main_from(["app", "unknown"]).await,
        ExitCode::FAILURE
    );
}

#[tokio::test]
async fn test_run_main_missing_config_file() {
    let mut builder = App::builder();
    assert_eq!(
        builder
            .run_main_from(["app", "-c", "/nonexistent/config.json", "config"])
            .await,
        ExitCode::FAILURE
    );
}

#[tokio::test]
async fn test_run_main_merges_config_files() {
    let main = write_config(r#"{"greeting": {"text": "hi", "volume": 11}}"#);
    let overlay = write_config(r#"{"greeting": {"text": "hello"}}"#);
    let mut builder = App::builder();
    builder.add_command::<CheckGreetingCommand>();
    let code = builder
        .run_main_from([
            "app",
            "--config",
            main.path().to_str().unwrap(),
            "-o",
            overlay.path().to_str().unwrap(),
            "check-greeting",
        ])
        .await;
    assert_eq!(code, ExitCode::SUCCESS);
}

#[tokio::test]
async fn test_run_main_merges_into_existing_config() {
    let overlay = write_config(r#"{"greeting": {"volume": 11}}"#);
    let mut builder = App::builder();
    builder
        .add_component(Config::new().with("greeting", json!({"text": "hello", "volume": 1})))
        .add_command::<CheckGreetingCommand>();
    let code = builder
        .run_main_from([
            "app",
            "-o",
            overlay.path().to_str().unwrap(),
            "check-greeting",
        ])
        .await;
    assert_eq!(code, ExitCode::SUCCESS);
}

#[tokio::test]
async fn test_config_command() {
    let app = Arc::new(
        App::builder()
            .add_component(Config::new().with("name", "test"))
            .build()
            .await
            .unwrap(),
    );
    assert_eq!(
        ConfigCommand::main(app, ArgMatches::default()).await,
        ExitCode::SUCCESS
    );

    let app = Arc::new(App::builder().build().await.unwrap());
    assert_eq!(
        ConfigCommand::main(app, ArgMatches::default()).await,
        ExitCode::FAILURE
    );
}

#[tokio::test]
async fn test_server_command_runs_daemons() {
    let mut builder = App::builder();
    builder.add_daemon(OneshotDaemon);
    assert_eq!(
        builder.run_main_from(["app", "server"]).await,
        ExitCode::SUCCESS
    );
    assert_eq!(ONESHOT_RUNS.load(Ordering::SeqCst), 1);
}
