//! logrelay operator CLI.
//!
//! The `logrelay` binary is a thin wrapper around [`run`]; the modules are
//! public so integration tests can drive command handlers directly.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

use cli::{Cli, Commands};
use error::CliError;
use output::OutputWriter;

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Grammar(args) => commands::grammar::execute(args, &cli.config, &writer).await,
        Commands::Webhook(args) => commands::webhook::execute(args, &cli.config, &writer).await,
    }
}
