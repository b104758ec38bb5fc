//! Pipeline lifecycle trait.
//!
//! Every long-running component the daemon manages implements [`Pipeline`].
//! The daemon stores them as `Box<dyn DynPipeline>`; the blanket impl
//! below bridges the two.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::RelayError;

/// Boxed, sendable future used by [`DynPipeline`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Health of a running component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Working normally
    Healthy,
    /// Working, but something needs attention
    Degraded(String),
    /// Not working
    Unhealthy(String),
}

impl HealthStatus {
    /// Whether the status is `Healthy`.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Whether the status is `Unhealthy`.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// Start/stop/health lifecycle.
pub trait Pipeline: Send + Sync {
    /// Starts background work. Fails if already running.
    fn start(&mut self) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Stops background work and waits for it to finish. Fails if not running.
    fn stop(&mut self) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Reports current health.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// Object-safe mirror of [`Pipeline`].
pub trait DynPipeline: Send + Sync {
    /// See [`Pipeline::start`].
    fn start(&mut self) -> BoxFuture<'_, Result<(), RelayError>>;

    /// See [`Pipeline::stop`].
    fn stop(&mut self) -> BoxFuture<'_, Result<(), RelayError>>;

    /// See [`Pipeline::health_check`].
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), RelayError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), RelayError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}
