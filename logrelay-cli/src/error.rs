//! CLI-specific error types and exit code mapping

use logrelay_core::error::RelayError;
use logrelay_pipeline::LogRelayError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Grammar could not be compiled or loaded.
    #[error("grammar error: {0}")]
    Grammar(String),

    /// The webhook did not accept the test message.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped error from logrelay-core.
    #[error("{0}")]
    Core(#[from] RelayError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                    |
    /// |------|----------------------------|
    /// | 0    | Success                    |
    /// | 1    | General / command error    |
    /// | 2    | Configuration error        |
    /// | 3    | Webhook delivery failed    |
    /// | 4    | Grammar error              |
    /// | 10   | IO error                   |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(RelayError::Config(_)) => 2,
            Self::Delivery(_) => 3,
            Self::Grammar(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<LogRelayError> for CliError {
    fn from(e: LogRelayError) -> Self {
        match e {
            LogRelayError::Config { .. } => Self::Config(e.to_string()),
            LogRelayError::Grammar { .. } | LogRelayError::Regex(_) | LogRelayError::Yaml(_) => {
                Self::Grammar(e.to_string())
            }
            LogRelayError::Sink(reason) => Self::Delivery(reason),
            LogRelayError::Io(io) => Self::Io(io),
            other => Self::Command(other.to_string()),
        }
    }
}
