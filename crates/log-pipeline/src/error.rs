//! Pipeline error types.
//!
//! [`LogRelayError`] covers every failure inside this crate. The
//! `From<LogRelayError> for RelayError` impl lets the daemon propagate
//! them with `?`.

use logrelay_core::error::{ConfigError, PipelineError, RelayError};

/// Errors raised by the tail/classify/relay pipeline.
#[derive(Debug, thiserror::Error)]
pub enum LogRelayError {
    /// Grammar could not be built or loaded
    #[error("grammar error: {grammar}: {reason}")]
    Grammar {
        /// Grammar name or file path
        grammar: String,
        /// Failure reason
        reason: String,
    },

    /// Tail follower I/O failure
    #[error("tail error: {path}: {reason}")]
    Tail {
        /// Followed path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Webhook sink could not be built
    #[error("sink error: {0}")]
    Sink(String),

    /// Checkpoint could not be read or written
    #[error("checkpoint error: {path}: {reason}")]
    Checkpoint {
        /// Checkpoint file path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Invalid runtime configuration
    #[error("config error: {field}: {reason}")]
    Config {
        /// Offending field
        field: String,
        /// Failure reason
        reason: String,
    },

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex compile error
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// YAML parse error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encode/decode error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LogRelayError> for RelayError {
    fn from(err: LogRelayError) -> Self {
        match err {
            LogRelayError::Config { field, reason } => {
                RelayError::Config(ConfigError::InvalidValue { field, reason })
            }
            LogRelayError::Io(e) => RelayError::Io(e),
            other => RelayError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
