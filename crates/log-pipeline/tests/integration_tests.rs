//! End-to-end relay tests: a real log file on disk, a recording webhook
//! transport, and a running `RelayPipeline`.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use logrelay_core::pipeline::{HealthStatus, Pipeline};
use logrelay_pipeline::{
    RelayPipeline, RelayPipelineBuilder, SourcePipelineConfig, SourcePipelineConfigBuilder,
    TransportResponse, WebhookTransport,
};

/// Records every POST and answers from a script (204 once exhausted).
#[derive(Clone, Default)]
struct Recorder {
    posts: Arc<Mutex<Vec<(Instant, serde_json::Value)>>>,
    script: Arc<Mutex<VecDeque<TransportResponse>>>,
    panic_once: Arc<Mutex<bool>>,
}

impl Recorder {
    fn scripted(responses: Vec<TransportResponse>) -> Self {
        Self {
            script: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    fn panicking_once() -> Self {
        Self {
            panic_once: Arc::new(Mutex::new(true)),
            ..Self::default()
        }
    }

    fn contents(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, p)| p["content"].as_str().unwrap_or_default().to_owned())
            .collect()
    }

    fn times(&self) -> Vec<Instant> {
        self.posts.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

impl WebhookTransport for Recorder {
    async fn post(&self, payload: &serde_json::Value) -> Result<TransportResponse, String> {
        {
            let mut panic_once = self.panic_once.lock().unwrap();
            if *panic_once {
                *panic_once = false;
                drop(panic_once);
                panic!("transport exploded");
            }
        }
        self.posts
            .lock()
            .unwrap()
            .push((Instant::now(), payload.clone()));
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or(TransportResponse::new(204)))
    }
}

fn append(path: &Path, data: &[u8]) {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(data).unwrap();
}

fn builder(log: &Path) -> SourcePipelineConfigBuilder {
    SourcePipelineConfigBuilder::new("tron", log)
        .server_name("Tron")
        .webhook_url("https://example.invalid/hook")
        .poll_interval(Duration::from_millis(10))
        .error_backoff(Duration::from_millis(20))
}

fn pipeline(config: SourcePipelineConfig, recorder: &Recorder) -> RelayPipeline<Recorder> {
    RelayPipelineBuilder::new(config)
        .transport(recorder.clone())
        .build_with_transport()
        .unwrap()
}

/// Polls `cond` until it holds or five seconds pass.
async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Lets the runner go idle a few times so nothing else is pending.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn relays_join_chat_and_logout() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(&log, b"");

    let recorder = Recorder::default();
    let mut p = pipeline(builder(&log).build().unwrap(), &recorder);
    p.start().await.unwrap();

    append(
        &log,
        b"[7] Alice entered the game.\n[0] Sending ping: 34ms\n[3] 192.168.0.5: hello\n[7] Alice: hi @everyone\n[7] received logout from 7.\n",
    );

    assert!(wait_until(|| recorder.contents().len() == 3).await);
    settle().await;
    assert_eq!(
        recorder.contents(),
        vec![
            "[Tron] + Alice entered the game".to_owned(),
            "[Tron] Alice: hi @\u{200d}everyone".to_owned(),
            "[Tron] - Alice left the game".to_owned(),
        ]
    );

    let stats = p.stats().snapshot();
    assert_eq!(stats.lines_read, 5);
    assert_eq!(stats.events_unmatched, 2);
    assert_eq!(stats.deliveries_ok, 3);
    assert!(p.health_check().await.is_healthy());
    p.stop().await.unwrap();
}

#[tokio::test]
async fn logout_of_unknown_id_uses_fallback_name() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(&log, b"[0] received logout from 12.\n");

    let recorder = Recorder::default();
    let mut p = pipeline(builder(&log).build().unwrap(), &recorder);
    p.start().await.unwrap();

    assert!(wait_until(|| recorder.contents().len() == 1).await);
    assert_eq!(recorder.contents()[0], "[Tron] - User 12 left the game");
    p.stop().await.unwrap();
}

#[tokio::test]
async fn ignored_names_still_update_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    let grammar = dir.path().join("ids.yaml");
    let ignore = dir.path().join("ignore.txt");
    std::fs::write(
        &grammar,
        r#"
name: ids
rules:
  - kind: join
    pattern: '^\[(?P<id>\d+)\] (?P<name>\S+) joined$'
  - kind: chat
    pattern: '^(?P<id>\d+) says (?P<message>.*)$'
"#,
    )
    .unwrap();
    std::fs::write(&ignore, "# muted\nalice\n").unwrap();
    append(&log, b"");

    let recorder = Recorder::default();
    let config = builder(&log)
        .grammar_file(&grammar)
        .ignore_file(&ignore)
        .build()
        .unwrap();
    let mut p = pipeline(config, &recorder);
    p.start().await.unwrap();

    append(&log, b"[7] Alice joined\n");
    let stats = p.stats();
    assert!(wait_until(|| stats.snapshot().events_ignored == 1).await);
    assert!(recorder.contents().is_empty());

    // un-ignore; the id-only chat must still resolve to the ignored join's name
    std::fs::write(&ignore, "# muted\nsomebody-else\n").unwrap();
    append(&log, b"7 says hi\n");
    assert!(wait_until(|| recorder.contents().len() == 1).await);
    assert_eq!(recorder.contents()[0], "[Tron] Alice: hi");
    p.stop().await.unwrap();
}

#[tokio::test]
async fn disabled_kinds_are_not_posted() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(
        &log,
        b"[1] Bob entered the game.\n[1] Bob: hello\n[1] Bob left the game.\n",
    );

    let recorder = Recorder::default();
    let config = builder(&log).post(false, true, false).build().unwrap();
    let mut p = pipeline(config, &recorder);
    p.start().await.unwrap();

    assert!(wait_until(|| recorder.contents().len() == 1).await);
    settle().await;
    assert_eq!(recorder.contents(), vec!["[Tron] - Bob left the game".to_owned()]);
    assert_eq!(p.stats().snapshot().events_toggled_off, 2);
    p.stop().await.unwrap();
}

#[tokio::test]
async fn truncation_reads_new_content_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(&log, b"[1] Bob: one\n[1] Bob: two\n");

    let recorder = Recorder::default();
    let mut p = pipeline(builder(&log).build().unwrap(), &recorder);
    p.start().await.unwrap();
    assert!(wait_until(|| recorder.contents().len() == 2).await);

    std::fs::write(&log, b"[2] Eve: three\n").unwrap();
    assert!(wait_until(|| recorder.contents().len() == 3).await);
    settle().await;
    assert_eq!(
        recorder.contents(),
        vec![
            "[Tron] Bob: one".to_owned(),
            "[Tron] Bob: two".to_owned(),
            "[Tron] Eve: three".to_owned(),
        ]
    );
    assert!(p.stats().snapshot().tail_reopens >= 1);
    p.stop().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn rotation_follows_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(&log, b"[1] Bob: before\n");

    let recorder = Recorder::default();
    let mut p = pipeline(builder(&log).build().unwrap(), &recorder);
    p.start().await.unwrap();
    assert!(wait_until(|| recorder.contents().len() == 1).await);

    std::fs::rename(&log, dir.path().join("server.log.1")).unwrap();
    append(&log, b"[1] Bob: after\n");

    assert!(wait_until(|| recorder.contents().len() == 2).await);
    settle().await;
    assert_eq!(recorder.contents()[1], "[Tron] Bob: after");
    assert_eq!(recorder.contents().len(), 2);
    p.stop().await.unwrap();
}

#[tokio::test]
async fn utf16le_log_is_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    let mut data = vec![0xFF, 0xFE];
    data.extend(
        "[4] Zoë entered the game.\r\n[4] Zoë: ça va\r\n"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes()),
    );
    append(&log, &data);

    let recorder = Recorder::default();
    let mut p = pipeline(builder(&log).build().unwrap(), &recorder);
    p.start().await.unwrap();

    assert!(wait_until(|| recorder.contents().len() == 2).await);
    assert_eq!(
        recorder.contents(),
        vec![
            "[Tron] + Zoë entered the game".to_owned(),
            "[Tron] Zoë: ça va".to_owned(),
        ]
    );
    p.stop().await.unwrap();
}

#[tokio::test]
async fn rate_limited_event_waits_and_is_delivered_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(&log, b"[1] Bob: slow down\n");

    let recorder = Recorder::scripted(vec![TransportResponse::rate_limited(Some(
        Duration::from_millis(300),
    ))]);
    let mut p = pipeline(builder(&log).build().unwrap(), &recorder);
    p.start().await.unwrap();

    assert!(wait_until(|| p.stats().snapshot().deliveries_ok == 1).await);
    settle().await;
    let times = recorder.times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_millis(300));
    assert_eq!(recorder.contents()[0], recorder.contents()[1]);
    p.stop().await.unwrap();
}

#[tokio::test]
async fn failures_degrade_health() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(&log, b"[1] Bob: a\n[1] Bob: b\n[1] Bob: c\n");

    let recorder = Recorder::scripted(vec![TransportResponse::new(500); 3]);
    let mut p = pipeline(builder(&log).build().unwrap(), &recorder);
    p.start().await.unwrap();

    assert!(wait_until(|| p.stats().consecutive_failures() == 3).await);
    assert!(matches!(
        p.health_check().await,
        HealthStatus::Degraded(reason) if reason.contains("delivery failures")
    ));
    // failed events are dropped, not retried
    assert_eq!(recorder.contents().len(), 3);
    p.stop().await.unwrap();
}

#[tokio::test]
async fn checkpoint_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    let checkpoint: PathBuf = dir.path().join("checkpoints").join("tron.json");
    append(&log, b"[1] Bob: one\n[1] Bob: two\n");

    let config = builder(&log)
        .checkpoint(&checkpoint, Duration::from_millis(10))
        .build()
        .unwrap();

    let first = Recorder::default();
    let mut p = pipeline(config.clone(), &first);
    p.start().await.unwrap();
    assert!(wait_until(|| first.contents().len() == 2).await);
    p.stop().await.unwrap();
    assert!(checkpoint.exists());

    append(&log, b"[1] Bob: three\n");

    let second = Recorder::default();
    let mut p = pipeline(config, &second);
    p.start().await.unwrap();
    assert!(wait_until(|| second.contents().len() == 1).await);
    settle().await;
    assert_eq!(second.contents(), vec!["[Tron] Bob: three".to_owned()]);
    p.stop().await.unwrap();
}

#[tokio::test]
async fn startup_test_post_is_sent_first() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(&log, b"[1] Bob: hi\n");

    let recorder = Recorder::default();
    let config = builder(&log).startup_test_post(true).build().unwrap();
    let mut p = pipeline(config, &recorder);
    p.start().await.unwrap();

    assert!(wait_until(|| recorder.contents().len() == 2).await);
    assert_eq!(recorder.contents()[0], "[Tron] relay online (startup test)");
    assert_eq!(recorder.contents()[1], "[Tron] Bob: hi");
    p.stop().await.unwrap();
}

#[tokio::test]
async fn panicking_runner_is_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(&log, b"[1] Bob: boom\n");

    let recorder = Recorder::panicking_once();
    let mut p = pipeline(builder(&log).build().unwrap(), &recorder);
    p.start().await.unwrap();

    // the line that panicked was never delivered, so it is read again
    assert!(wait_until(|| recorder.contents().len() == 1).await);
    assert_eq!(recorder.contents()[0], "[Tron] Bob: boom");
    assert_eq!(p.stats().restarts(), 1);
    p.stop().await.unwrap();
}

#[tokio::test]
async fn classify_only_without_webhook() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("server.log");
    append(&log, b"[1] Bob entered the game.\n");

    let config = SourcePipelineConfigBuilder::new("tron", &log)
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    let mut p = RelayPipelineBuilder::new(config).build().unwrap();
    p.start().await.unwrap();

    let stats = p.stats();
    assert!(wait_until(|| stats.snapshot().events_classified == 1).await);
    assert_eq!(stats.snapshot().deliveries_ok, 0);
    assert!(p.health_check().await.is_healthy());
    p.stop().await.unwrap();
}
