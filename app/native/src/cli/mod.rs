//! CLI module for Winstate.
//!
//! This module provides the command-line interface: replaying scenario
//! scripts, printing the configuration schema and generating completions.

mod commands;
mod output;

use clap::Parser;
pub use commands::{Cli, Commands};
pub use output::{render_table, write_records};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogConfig;
use crate::error::WinstateError;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV_VAR: &str = "WINSTATE_LOG";

/// Runs the CLI.
///
/// Parses command-line arguments and executes the appropriate command.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn run() -> Result<(), WinstateError> {
    let cli = Cli::parse();
    cli.execute()
}

/// Install the stderr `tracing` subscriber.
///
/// The filter comes from `WINSTATE_LOG`, then `log.filter`, then `warn`.
/// Calling this more than once is harmless.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init();
}
