//! Shared building blocks for the logrelay workspace.
//!
//! - [`config`]: `logrelay.toml` parsing, env overrides, validation
//! - [`error`]: top-level error taxonomy
//! - [`event`]: classified event model
//! - [`pipeline`]: start/stop/health lifecycle trait
//! - [`types`]: file identity and read position
//! - [`metrics`]: metric names

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod types;

pub use config::{MessageStyle, MessageTemplates, RelayConfig, SourceConfig};
pub use error::{ConfigError, PipelineError, RelayError};
pub use event::{Event, EventKind, EventMetadata, RelayEvent};
pub use pipeline::{DynPipeline, HealthStatus, Pipeline};
pub use types::{FileIdentity, LogPosition, SessionId};
