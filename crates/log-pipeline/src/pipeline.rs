//! Per-source relay pipeline.
//!
//! [`RelayPipeline`] implements the core [`Pipeline`] trait so the daemon
//! manages every source with the same start/stop/health lifecycle.
//!
//! # Architecture
//! ```text
//! supervisor task
//!   └── SourceRunner task (restarted after a panic)
//!         FileTailer -> LineClassifier -> toggles -> IgnoreList
//!                    -> MessageFormatter -> WebhookSink
//!                    -> CheckpointStore
//! ```
//!
//! One line is in flight at a time. Cancellation is observed between
//! lines, so a line that was read is always fully processed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logrelay_core::error::{PipelineError, RelayError};
use logrelay_core::event::{Event, EventKind, RelayEvent};
use logrelay_core::metrics as m;
use logrelay_core::pipeline::{HealthStatus, Pipeline};
use logrelay_core::types::LogPosition;

use crate::checkpoint::CheckpointStore;
use crate::classifier::{Grammar, LineClassifier};
use crate::collector::{FileTailer, RawLine, TailStep};
use crate::config::SourcePipelineConfig;
use crate::error::LogRelayError;
use crate::ignore::IgnoreList;
use crate::sink::webhook::{build_client, default_user_agent};
use crate::sink::{
    DeliveryOutcome, HttpTransport, MessageFormatter, WebhookSink, WebhookTransport,
};

/// Consecutive failed deliveries that mark a source degraded.
const DEGRADED_AFTER_FAILURES: u64 = 3;

/// Pipeline lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    Initialized,
    Running,
    Stopped,
}

/// Counters shared between the runner, the pipeline and the daemon.
#[derive(Debug, Default)]
pub struct PipelineStats {
    lines_read: AtomicU64,
    events_classified: AtomicU64,
    events_unmatched: AtomicU64,
    events_toggled_off: AtomicU64,
    events_ignored: AtomicU64,
    deliveries_ok: AtomicU64,
    deliveries_failed: AtomicU64,
    consecutive_failures: AtomicU64,
    restarts: AtomicU64,
    tail_reopens: AtomicU64,
    in_backoff: AtomicBool,
    last_position: Mutex<Option<LogPosition>>,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub events_classified: u64,
    pub events_unmatched: u64,
    pub events_toggled_off: u64,
    pub events_ignored: u64,
    pub deliveries_ok: u64,
    pub deliveries_failed: u64,
    pub consecutive_failures: u64,
    pub restarts: u64,
    pub tail_reopens: u64,
    pub in_backoff: bool,
    pub offset: Option<u64>,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            events_classified: self.events_classified.load(Ordering::Relaxed),
            events_unmatched: self.events_unmatched.load(Ordering::Relaxed),
            events_toggled_off: self.events_toggled_off.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            deliveries_ok: self.deliveries_ok.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            tail_reopens: self.tail_reopens.load(Ordering::Relaxed),
            in_backoff: self.in_backoff.load(Ordering::Relaxed),
            offset: self.last_position().map(|p| p.offset),
        }
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn in_backoff(&self) -> bool {
        self.in_backoff.load(Ordering::Relaxed)
    }

    /// Last position the runner fully processed.
    pub fn last_position(&self) -> Option<LogPosition> {
        match self.last_position.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_position(&self, position: LogPosition) {
        match self.last_position.lock() {
            Ok(mut guard) => *guard = Some(position),
            Err(poisoned) => *poisoned.into_inner() = Some(position),
        }
    }

    fn record_outcome(&self, outcome: &DeliveryOutcome) {
        if outcome.is_delivered() {
            self.deliveries_ok.fetch_add(1, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Read-only state shared by successive runners of one source.
struct RunnerContext<T: WebhookTransport> {
    config: SourcePipelineConfig,
    grammar: Arc<Grammar>,
    sink: Option<WebhookSink<T>>,
    formatter: MessageFormatter,
    stats: Arc<PipelineStats>,
}

/// Relay pipeline for one source.
///
/// # Example
/// ```ignore
/// use logrelay_pipeline::{RelayPipelineBuilder, SourcePipelineConfig};
///
/// let mut pipeline = RelayPipelineBuilder::new(config)
///     .client(shared_client)
///     .build()?;
/// pipeline.start().await?;
/// ```
pub struct RelayPipeline<T: WebhookTransport + 'static = HttpTransport> {
    config: SourcePipelineConfig,
    state: PipelineState,
    sink: Option<WebhookSink<T>>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

impl<T: WebhookTransport + 'static> RelayPipeline<T> {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SourcePipelineConfig {
        &self.config
    }

    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// Shared counters, valid across restarts.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// How long `stop` waits for the in-flight line before aborting.
    fn stop_grace(&self) -> Duration {
        let sink = &self.config.sink;
        sink.request_timeout * 2 + sink.max_retry_after * 2 + Duration::from_secs(1)
    }
}

impl<T: WebhookTransport + 'static> Pipeline for RelayPipeline<T> {
    async fn start(&mut self) -> Result<(), RelayError> {
        match self.state {
            PipelineState::Running => return Err(PipelineError::AlreadyRunning.into()),
            PipelineState::Stopped => {
                return Err(PipelineError::InitFailed(
                    "sink was consumed by a previous start, rebuild the pipeline to restart"
                        .to_owned(),
                )
                .into());
            }
            PipelineState::Initialized => {}
        }

        info!(source = %self.config.name, grammar = %self.config.grammar, "starting relay pipeline");

        let grammar = self.config.load_grammar().await.map_err(RelayError::from)?;
        let sink = self.sink.take();

        let resume_from = match &self.config.checkpoint_path {
            Some(path) => {
                let mut store = CheckpointStore::new(
                    path,
                    &self.config.name,
                    self.config.tail.path.display().to_string(),
                    self.config.checkpoint_interval,
                );
                match store.load().await {
                    Ok(position) => position,
                    Err(e) => {
                        warn!(source = %self.config.name, error = %e, "failed to load checkpoint, starting fresh");
                        None
                    }
                }
            }
            None => None,
        };

        if sink.is_none() {
            warn!(
                source = %self.config.name,
                "no webhook_url configured, events will be classified and dropped"
            );
        }

        let ctx = Arc::new(RunnerContext {
            formatter: MessageFormatter::new(&self.config.server_name, self.config.templates.clone()),
            config: self.config.clone(),
            grammar: Arc::new(grammar),
            sink,
            stats: Arc::clone(&self.stats),
        });

        self.cancel = CancellationToken::new();
        self.supervisor = Some(tokio::spawn(supervise(ctx, resume_from, self.cancel.clone())));
        self.state = PipelineState::Running;
        info!(source = %self.config.name, "relay pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RelayError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!(source = %self.config.name, "stopping relay pipeline");
        self.cancel.cancel();

        if let Some(mut handle) = self.supervisor.take() {
            let grace = self.stop_grace();
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(source = %self.config.name, error = %e, "supervisor task failed"),
                Err(_) => {
                    warn!(
                        source = %self.config.name,
                        grace_secs = grace.as_secs(),
                        "in-flight line did not finish in time, aborting"
                    );
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }

        self.state = PipelineState::Stopped;
        info!(source = %self.config.name, "relay pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let finished = self
                    .supervisor
                    .as_ref()
                    .is_none_or(|handle| handle.is_finished());
                if finished {
                    HealthStatus::Unhealthy("runner exited".to_owned())
                } else if self.stats.in_backoff() {
                    HealthStatus::Degraded(format!(
                        "tail error backoff on {}",
                        self.config.tail.path.display()
                    ))
                } else if self.stats.consecutive_failures() >= DEGRADED_AFTER_FAILURES {
                    HealthStatus::Degraded(format!(
                        "{} consecutive delivery failures",
                        self.stats.consecutive_failures()
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// Runs the source loop, restarting it after a panic.
async fn supervise<T: WebhookTransport + 'static>(
    ctx: Arc<RunnerContext<T>>,
    resume_from: Option<LogPosition>,
    cancel: CancellationToken,
) {
    let mut resume_from = resume_from;
    let mut first_run = true;
    loop {
        let runner = SourceRunner::new(Arc::clone(&ctx), resume_from, cancel.clone(), first_run);
        let mut task = AbortOnDrop(tokio::spawn(runner.run()));
        match (&mut task.0).await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                let restarts = ctx.stats.restarts.fetch_add(1, Ordering::Relaxed) + 1;
                let backoff = ctx.config.tail.error_backoff;
                error!(
                    source = %ctx.config.name,
                    restarts,
                    backoff_ms = backoff.as_millis() as u64,
                    "source runner panicked, restarting"
                );
                resume_from = ctx.stats.last_position().or(resume_from);
                first_run = false;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
            Err(_) => break,
        }
    }
}

/// Aborts the runner task when the supervisor is aborted mid-await.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The sequential tail → classify → deliver loop for one source.
struct SourceRunner<T: WebhookTransport> {
    ctx: Arc<RunnerContext<T>>,
    tailer: FileTailer,
    classifier: LineClassifier,
    ignore: IgnoreList,
    checkpoint: Option<CheckpointStore>,
    cancel: CancellationToken,
    startup_post: bool,
}

impl<T: WebhookTransport> SourceRunner<T> {
    fn new(
        ctx: Arc<RunnerContext<T>>,
        resume_from: Option<LogPosition>,
        cancel: CancellationToken,
        first_run: bool,
    ) -> Self {
        let config = &ctx.config;
        let checkpoint = config.checkpoint_path.as_ref().map(|path| {
            CheckpointStore::new(
                path,
                &config.name,
                config.tail.path.display().to_string(),
                config.checkpoint_interval,
            )
        });
        Self {
            tailer: FileTailer::new(config.tail.clone(), resume_from),
            classifier: LineClassifier::new(Arc::clone(&ctx.grammar)),
            ignore: IgnoreList::new(config.ignore_file.clone()),
            checkpoint,
            cancel,
            startup_post: first_run && config.startup_test_post,
            ctx,
        }
    }

    async fn run(mut self) {
        let source = self.ctx.config.name.clone();
        if self.startup_post {
            self.post_startup_message().await;
        }

        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                step = self.tailer.step() => step,
            };

            let wait = match step {
                TailStep::Line(line) => {
                    self.process_line(line).await;
                    continue;
                }
                TailStep::Opened(position) => {
                    self.ctx.stats.in_backoff.store(false, Ordering::Relaxed);
                    self.ctx.stats.set_position(position);
                    continue;
                }
                TailStep::Reopen(_) => {
                    self.ctx.stats.tail_reopens.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                TailStep::Idle => {
                    self.save_checkpoint(self.tailer.position()).await;
                    self.ctx.config.tail.poll_interval
                }
                TailStep::Backoff(_) => {
                    self.ctx.stats.in_backoff.store(true, Ordering::Relaxed);
                    self.ctx.config.tail.error_backoff
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if let Some(store) = self.checkpoint.as_mut() {
            let position = self
                .ctx
                .stats
                .last_position()
                .unwrap_or_else(|| self.tailer.position());
            if let Err(e) = store.flush(position).await {
                warn!(source = %source, error = %e, "failed to flush checkpoint");
            }
        }
        debug!(source = %source, "source runner exited");
    }

    async fn post_startup_message(&self) {
        let Some(sink) = &self.ctx.sink else {
            warn!(source = %self.ctx.config.name, "startup test post skipped, no webhook configured");
            return;
        };
        let message = self.ctx.formatter.startup_message();
        let outcome = sink.deliver(&message).await;
        self.ctx.stats.record_outcome(&outcome);
        if outcome.is_delivered() {
            info!(source = %self.ctx.config.name, "startup test post delivered");
        } else {
            error!(
                source = %self.ctx.config.name,
                outcome = ?outcome,
                "startup test post FAILED, check webhook_url; tailing continues"
            );
        }
    }

    async fn process_line(&mut self, line: RawLine) {
        let ctx = Arc::clone(&self.ctx);
        let stats = &ctx.stats;
        let config = &ctx.config;
        stats.lines_read.fetch_add(1, Ordering::Relaxed);

        let event = self.classifier.classify(&line.text);
        let kind = event.kind();
        metrics::counter!(
            m::EVENTS_CLASSIFIED_TOTAL,
            m::LABEL_SOURCE => config.name.clone(),
            m::LABEL_KIND => kind.as_str()
        )
        .increment(1);

        if !event.is_deliverable() {
            stats.events_unmatched.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.events_classified.fetch_add(1, Ordering::Relaxed);
            self.relay(event).await;
        }

        stats.set_position(line.position);
        self.save_checkpoint(line.position).await;
    }

    async fn relay(&mut self, event: Event) {
        let ctx = Arc::clone(&self.ctx);
        let config = &ctx.config;
        let kind = event.kind();
        if !self.kind_enabled(kind) {
            self.ctx.stats.events_toggled_off.fetch_add(1, Ordering::Relaxed);
            debug!(source = %config.name, kind = %kind, "event kind disabled, not posting");
            return;
        }

        if let Some(name) = event.name() {
            if self.ignore.is_ignored(name).await {
                self.ctx.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::EVENTS_IGNORED_TOTAL, m::LABEL_SOURCE => config.name.clone())
                    .increment(1);
                info!(source = %config.name, name, kind = %kind, "ignored name, not posting");
                return;
            }
        }

        let relay_event = RelayEvent::new(&config.name, event);
        info!(
            source = %config.name,
            event_id = %relay_event.metadata.short_id(),
            event = %relay_event.event,
            "relaying event"
        );

        let Some(sink) = &self.ctx.sink else {
            debug!(source = %config.name, "no webhook configured, event dropped");
            return;
        };
        let Some(message) = self.ctx.formatter.format(&relay_event) else {
            return;
        };
        let outcome = sink.deliver(&message).await;
        self.ctx.stats.record_outcome(&outcome);
    }

    fn kind_enabled(&self, kind: EventKind) -> bool {
        let config = &self.ctx.config;
        match kind {
            EventKind::Join => config.post_joins,
            EventKind::Leave => config.post_leaves,
            EventKind::Chat => config.post_chat,
            EventKind::Unmatched => false,
        }
    }

    async fn save_checkpoint(&mut self, position: LogPosition) {
        let Some(store) = self.checkpoint.as_mut() else {
            return;
        };
        if let Err(e) = store.maybe_save(position).await {
            warn!(source = %self.ctx.config.name, error = %e, "failed to save checkpoint");
        }
    }
}

/// Builder for [`RelayPipeline`].
pub struct RelayPipelineBuilder<T: WebhookTransport + 'static = HttpTransport> {
    config: SourcePipelineConfig,
    transport: Option<T>,
    client: Option<Client>,
}

impl RelayPipelineBuilder<HttpTransport> {
    pub fn new(config: SourcePipelineConfig) -> Self {
        Self {
            config,
            transport: None,
            client: None,
        }
    }

    /// Shares an HTTP client (and its connection pool) with other sources.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Validates the config and builds the pipeline with an HTTP sink
    /// when `webhook_url` is set.
    pub fn build(self) -> Result<RelayPipeline<HttpTransport>, LogRelayError> {
        let transport = match (&self.config.webhook_url, self.transport) {
            (_, Some(transport)) => Some(transport),
            (Some(url), None) => {
                let client = match self.client {
                    Some(client) => client,
                    None => build_client(&default_user_agent())?,
                };
                Some(HttpTransport::new(client, url, self.config.sink.request_timeout))
            }
            (None, None) => None,
        };
        finish(self.config, transport)
    }

    /// Replaces the HTTP transport, e.g. with a test double.
    pub fn transport<U: WebhookTransport + 'static>(self, transport: U) -> RelayPipelineBuilder<U> {
        RelayPipelineBuilder {
            config: self.config,
            transport: Some(transport),
            client: None,
        }
    }
}

impl<T: WebhookTransport + 'static> RelayPipelineBuilder<T> {
    /// Validates the config and builds the pipeline with the given transport.
    pub fn build_with_transport(self) -> Result<RelayPipeline<T>, LogRelayError> {
        finish(self.config, self.transport)
    }
}

fn finish<T: WebhookTransport + 'static>(
    config: SourcePipelineConfig,
    transport: Option<T>,
) -> Result<RelayPipeline<T>, LogRelayError> {
    config.validate()?;
    let sink = transport.map(|t| WebhookSink::new(t, config.sink.clone()));
    Ok(RelayPipeline {
        config,
        state: PipelineState::Initialized,
        sink,
        stats: Arc::new(PipelineStats::default()),
        cancel: CancellationToken::new(),
        supervisor: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcePipelineConfigBuilder;
    use crate::sink::TransportResponse;

    struct AlwaysOk;

    impl WebhookTransport for AlwaysOk {
        async fn post(&self, _payload: &serde_json::Value) -> Result<TransportResponse, String> {
            Ok(TransportResponse::new(204))
        }
    }

    fn config(dir: &std::path::Path) -> SourcePipelineConfig {
        SourcePipelineConfigBuilder::new("tron", dir.join("server.log"))
            .poll_interval(Duration::from_millis(10))
            .error_backoff(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_creates_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = RelayPipelineBuilder::new(config(dir.path())).build().unwrap();
        assert_eq!(pipeline.state_name(), "initialized");
        assert_eq!(pipeline.name(), "tron");
        assert!(pipeline.sink.is_none());
    }

    #[test]
    fn builder_with_webhook_creates_http_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.webhook_url = Some("https://example.com/hook".to_owned());
        let pipeline = RelayPipelineBuilder::new(cfg).build().unwrap();
        let sink = pipeline.sink.as_ref().unwrap();
        assert_eq!(sink.transport().url(), "https://example.com/hook");
    }

    #[test]
    fn builder_with_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.tail.max_line_bytes = 0;
        assert!(RelayPipelineBuilder::new(cfg).build().is_err());
    }

    #[tokio::test]
    async fn pipeline_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = RelayPipelineBuilder::new(config(dir.path()))
            .transport(AlwaysOk)
            .build_with_transport()
            .unwrap();

        assert!(pipeline.health_check().await.is_unhealthy());
        assert!(pipeline.stop().await.is_err());

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.state_name(), "running");
        assert!(pipeline.start().await.is_err());

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state_name(), "stopped");
        assert!(pipeline.health_check().await.is_unhealthy());

        // the sink was consumed
        assert!(pipeline.start().await.is_err());
    }

    #[tokio::test]
    async fn missing_log_file_is_degraded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = RelayPipelineBuilder::new(config(dir.path()))
            .transport(AlwaysOk)
            .build_with_transport()
            .unwrap();
        pipeline.start().await.unwrap();

        let mut status = HealthStatus::Healthy;
        for _ in 0..100 {
            status = pipeline.health_check().await;
            if !status.is_healthy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(status, HealthStatus::Degraded(ref r) if r.contains("backoff")));
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_grammar_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.grammar = crate::config::GrammarSource::Preset("tetris".to_owned());
        let mut pipeline = RelayPipelineBuilder::new(cfg)
            .transport(AlwaysOk)
            .build_with_transport()
            .unwrap();
        assert!(pipeline.start().await.is_err());
        assert_eq!(pipeline.state_name(), "initialized");
    }

    /// Never answers; flags when its in-flight post is dropped.
    struct Stalled {
        entered: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl WebhookTransport for Stalled {
        async fn post(&self, _payload: &serde_json::Value) -> Result<TransportResponse, String> {
            let _guard = SetOnDrop(Arc::clone(&self.dropped));
            self.entered.store(true, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(TransportResponse::new(204))
        }
    }

    #[tokio::test]
    async fn stop_past_grace_aborts_in_flight_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.sink.request_timeout = Duration::from_millis(10);
        cfg.sink.max_retry_after = Duration::from_millis(10);
        cfg.startup_test_post = true;

        let entered = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let mut pipeline = RelayPipelineBuilder::new(cfg)
            .transport(Stalled {
                entered: Arc::clone(&entered),
                dropped: Arc::clone(&dropped),
            })
            .build_with_transport()
            .unwrap();
        pipeline.start().await.unwrap();

        for _ in 0..200 {
            if entered.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(entered.load(Ordering::SeqCst), "delivery never started");

        pipeline.stop().await.unwrap();
        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(Ordering::SeqCst), "runner outlived stop");
    }

    #[test]
    fn stats_track_consecutive_failures() {
        let stats = PipelineStats::default();
        let failed = DeliveryOutcome::Failed {
            reason: "HTTP 500".to_owned(),
        };
        stats.record_outcome(&failed);
        stats.record_outcome(&failed);
        assert_eq!(stats.consecutive_failures(), 2);
        stats.record_outcome(&DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(stats.consecutive_failures(), 0);

        let snap = stats.snapshot();
        assert_eq!(snap.deliveries_ok, 1);
        assert_eq!(snap.deliveries_failed, 2);
        assert_eq!(snap.offset, None);
    }
}
