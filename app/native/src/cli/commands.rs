//! CLI command definitions using Clap.
//!
//! This module defines all CLI commands and their arguments.

use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Generator, Shell, generate};

use super::output;
use crate::config::{self, OutputFormat, WinstateConfig};
use crate::error::WinstateError;
use crate::replay::{Replayer, Script};

/// Application version from Cargo.toml.
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Winstate CLI - replay window and application scenarios against the
/// reconciled property model.
#[derive(Parser, Debug)]
#[command(name = "winstate")]
#[command(author, version = APP_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Use this configuration file instead of searching the default locations.
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
#[command(next_display_order = None)]
pub enum Commands {
    /// Replay a scenario script and print the events it publishes.
    ///
    /// The script is a JSONC file of steps (launch, createWindow, write,
    /// external, settle, destroyWindow, terminate) applied in order to a
    /// fresh state backed by simulated attributes.
    #[command(
        verbatim_doc_comment,
        after_long_help = r#"Examples:
  winstate replay drag.jsonc                 # Table of recorded events
  winstate replay drag.jsonc --format json   # One JSON object per line"#
    )]
    Replay {
        /// Path to the script file.
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Output format. Defaults to `replay.format` from the configuration.
        #[arg(long, short, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Output Winstate configuration JSON Schema.
    ///
    /// Outputs a JSON Schema to stdout that describes the structure of the
    /// configuration file. Can be redirected to a file for use with editors
    /// that support JSON Schema validation.
    Schema,

    /// Generate shell completions.
    ///
    /// Outputs shell completion script to stdout for the specified shell.
    /// Can be used with eval or redirected to a file.
    ///
    /// Usage:
    ///   eval "$(winstate completions --shell zsh)"
    ///   winstate completions --shell fish > ~/.config/fish/completions/winstate.fish
    Completions {
        /// The shell to generate completions for.
        #[arg(long, short, value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command execution fails.
    pub fn execute(&self) -> Result<(), WinstateError> {
        let config = self.load_config();

        match &self.command {
            Commands::Replay { script, format } => {
                let format = format.unwrap_or(config.replay.format);
                Self::execute_replay(script, format)?;
            }

            Commands::Schema => {
                println!("{}", config::schema_json()?);
            }

            Commands::Completions { shell } => {
                Self::print_completions(*shell);
            }
        }

        Ok(())
    }

    /// Load the configuration and install logging.
    ///
    /// A broken configuration file does not stop the command: the error is
    /// logged once logging is up and the defaults are used.
    fn load_config(&self) -> WinstateConfig {
        match config::load(self.config.as_deref()) {
            Ok((config, path)) => {
                super::init_logging(&config.log);
                if let Some(path) = path {
                    tracing::debug!(path = %path.display(), "configuration loaded");
                }
                config
            }
            Err(err) => {
                let config = WinstateConfig::default();
                super::init_logging(&config.log);
                tracing::warn!(error = %err, "using default configuration");
                config
            }
        }
    }

    /// Print shell completions to stdout.
    fn print_completions<G: Generator>(generator: G) {
        let mut cmd = Self::command();
        generate(generator, &mut cmd, "winstate", &mut io::stdout());
    }

    /// Execute the replay command.
    fn execute_replay(path: &Path, format: OutputFormat) -> Result<(), WinstateError> {
        let script = Script::from_path(path)?;
        let records = Replayer::new().run(&script)?;

        let stdout = io::stdout();
        output::write_records(&mut stdout.lock(), &records, format)?;
        Ok(())
    }
}
