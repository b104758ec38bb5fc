//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// logrelay -- game server log relay tooling.
///
/// Use `logrelay <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "logrelay", version, about, long_about = None)]
pub struct Cli {
    /// Path to the logrelay.toml configuration file.
    #[arg(short, long, default_value = "logrelay.toml")]
    pub config: PathBuf,

    /// Log level for diagnostics on stderr (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration.
    Config(ConfigArgs),

    /// Inspect grammars and test them against log lines.
    Grammar(GrammarArgs),

    /// Send a test message to a source's webhook.
    Webhook(WebhookArgs),
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, metrics, sources).
        #[arg(long, conflicts_with = "source")]
        section: Option<String>,
        /// Show only the named source.
        #[arg(long)]
        source: Option<String>,
    },
}

// ---- grammar ----

#[derive(Args, Debug)]
pub struct GrammarArgs {
    #[command(subcommand)]
    pub action: GrammarAction,
}

#[derive(Subcommand, Debug)]
pub enum GrammarAction {
    /// List built-in grammar presets.
    List,
    /// Classify lines with a grammar and print the events.
    Test(GrammarTestArgs),
}

/// Which grammar to test and which lines to feed it.
#[derive(Args, Debug)]
pub struct GrammarTestArgs {
    /// Built-in preset name.
    #[arg(long, conflicts_with_all = ["file", "source"])]
    pub preset: Option<String>,

    /// YAML grammar file.
    #[arg(long, conflicts_with = "source")]
    pub file: Option<PathBuf>,

    /// Use the grammar (and heuristic overrides) of a configured source.
    #[arg(long)]
    pub source: Option<String>,

    /// A log line to classify; repeatable.
    #[arg(long = "line", short = 'l')]
    pub lines: Vec<String>,

    /// Classify every line of a log file (UTF-8 or UTF-16LE).
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Also list lines that matched nothing.
    #[arg(long)]
    pub show_unmatched: bool,
}

// ---- webhook ----

#[derive(Args, Debug)]
pub struct WebhookArgs {
    #[command(subcommand)]
    pub action: WebhookAction,
}

#[derive(Subcommand, Debug)]
pub enum WebhookAction {
    /// Post a test message through the source's sink settings.
    Test {
        /// Source name from the configuration file.
        source: String,
        /// Message text (default: the startup test message).
        #[arg(long)]
        message: Option<String>,
    },
}
