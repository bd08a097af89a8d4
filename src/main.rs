//! Binary entry point for the stratus CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use stratus::resources::bundled_kinds;
use stratus::{ConfigError, KindRegistry, OperatorConfig, ReconcileError};

mod cli;

use cli::{Cli, ConfigCommand, KindsCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("kind registry error: {0}")]
    Kinds(#[from] ReconcileError),
    #[error("failed to render output: {0}")]
    Render(String),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli, &mut io::stdout()) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn dispatch(cli: Cli, out: &mut impl Write) -> Result<(), CliError> {
    match cli {
        Cli::Kinds(command) => print_kinds(&bundled_kinds(), &command, out),
        Cli::Config(command) => print_config(&command, out),
    }
}

fn print_kinds(
    registry: &KindRegistry,
    command: &KindsCommand,
    out: &mut impl Write,
) -> Result<(), CliError> {
    for kind in registry.deletion_order()? {
        let referenced = registry.referenced_kinds(kind);
        if command.references && !referenced.is_empty() {
            writeln!(out, "{kind} -> {}", referenced.join(", "))?;
        } else {
            writeln!(out, "{kind}")?;
        }
    }
    Ok(())
}

fn print_config(command: &ConfigCommand, out: &mut impl Write) -> Result<(), CliError> {
    let config = OperatorConfig::load_without_cli_args()?;
    if !command.no_validate {
        config.validate()?;
    }
    let rendered =
        serde_json::to_string_pretty(&config).map_err(|err| CliError::Render(err.to_string()))?;
    writeln!(out, "{rendered}")?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
