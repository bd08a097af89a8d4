//! Command-line interface definitions for the `stratus` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `stratus` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stratus",
    about = "Inspect the stratus multi-cloud resource operator",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Print the bundled resource kinds in Nuke deletion order.
    #[command(name = "kinds", about = "Print the bundled kinds in Nuke deletion order")]
    Kinds(KindsCommand),
    /// Print the effective operator configuration.
    #[command(name = "config", about = "Print the effective operator configuration")]
    Config(ConfigCommand),
}

/// Arguments for the `stratus kinds` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct KindsCommand {
    /// Also print the kinds each kind references.
    #[arg(long)]
    pub(crate) references: bool,
}

/// Arguments for the `stratus config` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ConfigCommand {
    /// Skip validation of the merged values.
    #[arg(long)]
    pub(crate) no_validate: bool,
}
