//! logrelay daemon library.
//!
//! Exposes the orchestrator and its parts for integration tests;
//! production use goes through the `logrelay-daemon` binary.

pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod modules;
pub mod orchestrator;

pub use health::{DaemonHealth, ModuleHealth};
pub use orchestrator::Orchestrator;
