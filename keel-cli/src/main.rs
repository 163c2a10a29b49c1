//! Keel CLI - dependency-aware schema migrations.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use keel_cli::cli::{Cli, Command};
use keel_cli::commands::{self, Project};
use keel_cli::error::CliResult;
use keel_cli::output;

#[tokio::main]
async fn main() {
    // Run the CLI and handle errors
    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::Version = cli.command {
        return commands::version::run().await;
    }

    let project = Project::load(&cli.config, cli.dir, cli.manifest)?;

    // Run the appropriate command
    match cli.command {
        Command::Migrate(args) => commands::migrate::run(&project, args).await,
        Command::Plan(args) => commands::plan::run(&project, args).await,
        Command::Rehearse(args) => commands::rehearse::run(&project, args).await,
        Command::Status(args) => commands::status::run(&project, args).await,
        Command::Validate(args) => commands::validate::run(&project, args).await,
        Command::Seed(args) => commands::seed::run(&project, args).await,
        Command::Manifest(args) => commands::manifest::run(&project, args).await,
        Command::Version => commands::version::run().await,
    }
}

/// Logs go to stderr so `--json` output stays parseable.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("keel=debug,keel_cli=debug,keel_migrate=debug,keel_postgres=debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
