//! Source orchestration and process lifecycle.
//!
//! The [`Orchestrator`] loads configuration, builds one relay pipeline per
//! enabled source on a shared HTTP client, starts them, logs health
//! periodically, and stops them when a shutdown signal arrives.
//!
//! Sources are independent: they share nothing but the read-only
//! configuration and the client's connection pool.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use logrelay_core::config::RelayConfig;

use crate::health::{DaemonHealth, aggregate_status, log_health};
use crate::metrics_server;
use crate::modules::{ModuleRegistry, relay};

/// How often the uptime gauge is refreshed.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: RelayConfig,
    modules: ModuleRegistry,
    /// Signals background tasks (uptime updater) to exit.
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `logrelay.toml` (with env overrides) and build the orchestrator.
    ///
    /// # Errors
    ///
    /// - Configuration file cannot be read, parsed or validated
    /// - A source pipeline cannot be built
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = RelayConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    pub fn build_from_config(config: RelayConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let client = relay::shared_client()?;
        let modules = relay::init_all(&config, &client)?;
        if modules.count() == 0 {
            tracing::warn!("no enabled sources, the daemon will idle until stopped");
        }

        let (shutdown_tx, _) = broadcast::channel(4);
        tracing::info!(sources = modules.count(), "orchestrator initialized");

        Ok(Self {
            config,
            modules,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start every source and run until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal = signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
            }
        })
        .await
    }

    /// Start every source and run until `shutdown` completes.
    ///
    /// Writes the PID file first and removes it on every exit path.
    /// A source that fails to start rolls back the ones already started.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let pid_file = (!self.config.general.pid_file.is_empty())
            .then(|| self.config.general.pid_file.clone());
        if let Some(path) = &pid_file {
            write_pid_file(Path::new(path))?;
        }

        let result = self.run_started(shutdown).await;

        if let Some(path) = &pid_file {
            remove_pid_file(Path::new(path));
        }
        result
    }

    async fn run_started<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!("starting all sources");
        if let Err(e) = self.modules.start_all().await {
            tracing::warn!("startup failed, rolling back already-started sources");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            return Err(e);
        }

        record_active_sources(self.modules.enabled_count());

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        let health_interval = self.config.general.health_interval_secs;
        tracing::info!(
            sources = self.modules.enabled_count(),
            health_interval_secs = health_interval,
            "logrelay running"
        );

        tokio::pin!(shutdown);
        if health_interval == 0 {
            shutdown.await;
        } else {
            let period = Duration::from_secs(health_interval);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => {
                        let health = self.health().await;
                        log_health(&health);
                    }
                }
            }
        }

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        tracing::info!("stopping all sources");
        let result = self.modules.stop_all().await;
        record_active_sources(0);
        result
    }

    /// Current aggregated health of every source.
    pub async fn health(&self) -> DaemonHealth {
        let modules = self.modules.health_statuses().await;
        let status = aggregate_status(&modules);
        DaemonHealth {
            status,
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Names of the registered sources in start order.
    pub fn source_names(&self) -> Vec<&str> {
        self.modules.names()
    }
}

/// Wait for SIGTERM or SIGINT and return which one arrived.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl-C handler: {}", e))?;
    Ok("CTRL_C")
}

/// Keeps only the named sources enabled.
///
/// An empty list leaves the configuration untouched. Naming a source that
/// is not configured is an error; naming a disabled one enables it.
pub fn restrict_sources(config: &mut RelayConfig, only: &[String]) -> Result<()> {
    if only.is_empty() {
        return Ok(());
    }
    for name in only {
        if !config.sources.iter().any(|s| &s.name == name) {
            return Err(anyhow::anyhow!("--only names unknown source '{}'", name));
        }
    }
    for source in &mut config.sources {
        source.enabled = only.contains(&source.name);
    }
    Ok(())
}

/// Write the current process PID to a file.
///
/// # Security
///
/// - `create_new(true)` makes creation atomic, so a second instance fails
/// - The parent directory is created with mode 0o700 and the file with 0o600
/// - Anything other than a regular file at the path is rejected
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                fs::DirBuilder::new()
                    .mode(0o700)
                    .recursive(true)
                    .create(parent)?;
            }
            #[cfg(not(unix))]
            {
                fs::create_dir_all(parent)?;
            }
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file. Logs instead of failing.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

fn record_active_sources(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(logrelay_core::metrics::ACTIVE_SOURCES).set(count as f64);
}

/// Keeps the uptime gauge fresh for Prometheus scrapes.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use logrelay_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
