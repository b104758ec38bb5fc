//! CLI argument definitions for logrelay-daemon.

use std::path::PathBuf;

use clap::Parser;

/// Game server log relay daemon.
///
/// Follows every enabled source in `logrelay.toml` and posts join, leave
/// and chat events to its webhook.
#[derive(Parser, Debug)]
#[command(name = "logrelay-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logrelay.toml configuration file.
    #[arg(short, long, default_value = "/etc/logrelay/logrelay.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,

    /// Run only these sources, by name (repeatable). Others are disabled.
    #[arg(long = "only", value_name = "SOURCE")]
    pub only: Vec<String>,
}
