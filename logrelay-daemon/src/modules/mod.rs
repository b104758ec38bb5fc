//! Module registry.
//!
//! Each source pipeline is wrapped as a [`ModuleHandle`] that provides
//! uniform lifecycle management via the [`DynPipeline`] trait.
//! The [`ModuleRegistry`] starts them in registration order and stops
//! them in reverse.

pub mod relay;

use std::sync::Arc;

use logrelay_core::pipeline::{DynPipeline, HealthStatus};
use logrelay_pipeline::PipelineStats;

/// A handle to a registered module.
pub struct ModuleHandle {
    /// Module name for logging and health reporting.
    pub name: String,
    /// Whether this module is enabled in configuration.
    pub enabled: bool,
    /// The module's lifecycle implementation.
    pub pipeline: Box<dyn DynPipeline>,
    /// Counters shared with the running pipeline, if it exposes any.
    pub stats: Option<Arc<PipelineStats>>,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            enabled,
            pipeline,
            stats: None,
        }
    }

    /// Attaches the pipeline's counters for health reporting.
    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Disabled modules always report `Healthy`.
    pub async fn health_check(&self) -> HealthStatus {
        if !self.enabled {
            return HealthStatus::Healthy;
        }
        self.pipeline.health_check().await
    }
}

/// Registry of all modules in start order.
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Register a module. Names must be unique.
    pub fn register(&mut self, handle: ModuleHandle) -> anyhow::Result<()> {
        if self.modules.iter().any(|m| m.name == handle.name) {
            return Err(anyhow::anyhow!(
                "module '{}' is already registered",
                handle.name
            ));
        }
        self.modules.push(handle);
        Ok(())
    }

    /// Start all enabled modules in registration order.
    ///
    /// Returns an error on the first module that fails to start.
    /// Already-started modules are NOT rolled back; the caller should
    /// invoke `stop_all` if partial startup is unacceptable.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        for handle in &mut self.modules {
            if !handle.enabled {
                tracing::debug!(module = %handle.name, "skipping disabled module");
                continue;
            }

            tracing::info!(module = %handle.name, "starting module");
            handle
                .pipeline
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start module '{}': {}", handle.name, e))?;
        }
        Ok(())
    }

    /// Stop all enabled modules in reverse registration order.
    ///
    /// Keeps going past failures and reports them together. Modules that
    /// were never started report `NotRunning`, which is not an error here.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        use logrelay_core::error::{PipelineError, RelayError};

        let mut errors = Vec::new();

        for handle in self.modules.iter_mut().rev() {
            if !handle.enabled {
                continue;
            }

            match handle.pipeline.stop().await {
                Ok(()) => tracing::info!(module = %handle.name, "module stopped"),
                Err(RelayError::Pipeline(PipelineError::NotRunning)) => {
                    tracing::debug!(module = %handle.name, "module was not running");
                }
                Err(e) => {
                    tracing::error!(module = %handle.name, error = %e, "failed to stop module");
                    errors.push(format!("{}: {}", handle.name, e));
                }
            }
        }

        if !errors.is_empty() {
            return Err(anyhow::anyhow!(
                "errors stopping modules: {}",
                errors.join("; ")
            ));
        }

        Ok(())
    }

    /// Health of every module, with stats where attached.
    pub async fn health_statuses(&self) -> Vec<crate::health::ModuleHealth> {
        let mut statuses = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            statuses.push(crate::health::ModuleHealth {
                name: handle.name.clone(),
                enabled: handle.enabled,
                status: handle.health_check().await,
                stats: handle.stats.as_ref().map(|s| s.snapshot()),
            });
        }
        statuses
    }

    /// Number of registered modules.
    pub fn count(&self) -> usize {
        self.modules.len()
    }

    /// Number of enabled modules.
    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|m| m.enabled).count()
    }

    /// Registered module names in start order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logrelay_core::error::{PipelineError, RelayError};
    use logrelay_core::pipeline::Pipeline;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        running: bool,
        fail_start: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn boxed(name: &'static str, fail_start: bool, log: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                name,
                running: false,
                fail_start,
                log: Arc::clone(log),
            })
        }
    }

    impl Pipeline for Recorder {
        async fn start(&mut self) -> Result<(), RelayError> {
            if self.fail_start {
                return Err(PipelineError::InitFailed("boom".into()).into());
            }
            self.running = true;
            self.log.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), RelayError> {
            if !self.running {
                return Err(PipelineError::NotRunning.into());
            }
            self.running = false;
            self.log.lock().unwrap().push(format!("stop {}", self.name));
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            if self.running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy("stopped".into())
            }
        }
    }

    #[tokio::test]
    async fn starts_in_order_and_stops_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleHandle::new("a", true, Recorder::boxed("a", false, &log)))
            .unwrap();
        registry
            .register(ModuleHandle::new("b", true, Recorder::boxed("b", false, &log)))
            .unwrap();

        registry.start_all().await.unwrap();
        registry.stop_all().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start a", "start b", "stop b", "stop a"]
        );
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleHandle::new("a", true, Recorder::boxed("a", false, &log)))
            .unwrap();
        let err = registry
            .register(ModuleHandle::new("a", true, Recorder::boxed("a", false, &log)))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn failed_start_then_stop_all_skips_never_started() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleHandle::new("a", true, Recorder::boxed("a", false, &log)))
            .unwrap();
        registry
            .register(ModuleHandle::new("b", true, Recorder::boxed("b", true, &log)))
            .unwrap();

        let err = registry.start_all().await.unwrap_err();
        assert!(err.to_string().contains("'b'"));

        registry.stop_all().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["start a", "stop a"]);
    }

    #[tokio::test]
    async fn disabled_module_is_skipped_and_reported_healthy() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleHandle::new("off", false, Recorder::boxed("off", false, &log)))
            .unwrap();

        registry.start_all().await.unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(registry.enabled_count(), 0);

        let statuses = registry.health_statuses().await;
        assert!(statuses[0].status.is_healthy());
        assert!(statuses[0].stats.is_none());
    }
}
