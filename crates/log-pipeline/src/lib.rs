//! Tail follower, line classifier and webhook relay for game server logs.
//!
//! # Modules
//!
//! - [`collector`]: [`FileTailer`], a rotation and truncation aware file follower
//! - [`decoder`]: UTF-8 / UTF-16LE detection and line cleaning
//! - [`classifier`]: grammars (presets and YAML), speaker heuristic, [`LineClassifier`]
//! - [`session`]: session id → display name tracking
//! - [`ignore`]: hot-reloaded ignored-name list
//! - [`sink`]: message formatting and the rate-limit aware [`WebhookSink`]
//! - [`checkpoint`]: per-source read position persistence
//! - [`pipeline`]: [`RelayPipeline`], one supervised task per source
//! - [`config`]: runtime config derived from `logrelay.toml`
//! - [`error`]: domain error type
//!
//! # Architecture
//!
//! ```text
//! FileTailer -> LineClassifier -> toggles -> IgnoreList -> MessageFormatter -> WebhookSink
//!     |               |                                                          |
//!  Decoder      SessionTracker                                         429 wait + one retry
//! ```

pub mod checkpoint;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod decoder;
pub mod error;
pub mod ignore;
pub mod pipeline;
pub mod session;
pub mod sink;

// --- re-exports ---

// Pipeline
pub use pipeline::{PipelineStats, RelayPipeline, RelayPipelineBuilder, StatsSnapshot};

// Config
pub use config::{GrammarSource, SourcePipelineConfig, SourcePipelineConfigBuilder};

// Errors
pub use error::LogRelayError;

// Tailing
pub use collector::{FileTailer, RawLine, TailStep, TailerConfig};

// Decoding
pub use decoder::{Encoding, LineDecoder};

// Classification
pub use classifier::{Grammar, GrammarSpec, LineClassifier, RuleKind, SpeakerHeuristic};

// Sessions
pub use session::SessionTracker;

// Ignore list
pub use ignore::IgnoreList;

// Delivery
pub use sink::{
    DeliveryOutcome, HttpTransport, MessageFormatter, OutboundMessage, SinkConfig,
    TransportResponse, WebhookSink, WebhookTransport,
};

// Checkpoints
pub use checkpoint::CheckpointStore;
