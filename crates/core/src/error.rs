//! Error types shared by every logrelay crate.
//!
//! Domain crates define their own error enums and convert into
//! [`RelayError`] so the binaries can propagate everything with `?`.

/// Top-level logrelay error.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline lifecycle or processing error
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file does not exist
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// TOML could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A field holds an invalid value
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Pipeline lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// `start()` called on a running pipeline
    #[error("pipeline already running")]
    AlreadyRunning,

    /// `stop()` called on a pipeline that is not running
    #[error("pipeline not running")]
    NotRunning,

    /// Pipeline could not be built or started
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// Background task failed to join
    #[error("pipeline task failed: {0}")]
    TaskFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_relay_error() {
        let err: RelayError = ConfigError::InvalidValue {
            field: "sources[0].log_path".to_owned(),
            reason: "must not be empty".to_owned(),
        }
        .into();
        assert!(matches!(err, RelayError::Config(_)));
        assert!(err.to_string().contains("sources[0].log_path"));
    }

    #[test]
    fn pipeline_error_display() {
        let err: RelayError = PipelineError::AlreadyRunning.into();
        assert_eq!(err.to_string(), "pipeline error: pipeline already running");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RelayError = io.into();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
