//! Per-source read position checkpoint.
//!
//! One small JSON file per source, replaced atomically (write to a
//! sibling temp file, then rename). Writes are throttled to one per
//! interval; [`CheckpointStore::flush`] bypasses the throttle on stop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use logrelay_core::types::LogPosition;

use crate::error::LogRelayError;

/// On-disk checkpoint record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub source: String,
    pub log_path: String,
    pub position: LogPosition,
    pub saved_at: DateTime<Utc>,
}

/// Loads and saves one source's [`LogPosition`].
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    source: String,
    log_path: String,
    interval: Duration,
    last_saved: Option<LogPosition>,
    last_write: Option<Instant>,
}

impl CheckpointStore {
    pub fn new(
        path: impl Into<PathBuf>,
        source: impl Into<String>,
        log_path: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            log_path: log_path.into(),
            interval,
            last_saved: None,
            last_write: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved position. `Ok(None)` when no checkpoint exists or
    /// it was written for a different log path.
    pub async fn load(&mut self) -> Result<Option<LogPosition>, LogRelayError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(format!("read failed: {e}"))),
        };
        let record: CheckpointRecord = serde_json::from_str(&content)
            .map_err(|e| self.error(format!("invalid checkpoint: {e}")))?;

        if record.log_path != self.log_path {
            tracing::info!(
                source = %self.source,
                saved = %record.log_path,
                current = %self.log_path,
                "checkpoint belongs to another log path, ignoring"
            );
            return Ok(None);
        }
        self.last_saved = Some(record.position);
        Ok(Some(record.position))
    }

    /// Saves `position` if it changed and the interval has elapsed.
    /// Returns whether a write happened.
    pub async fn maybe_save(&mut self, position: LogPosition) -> Result<bool, LogRelayError> {
        if self.last_saved == Some(position) {
            return Ok(false);
        }
        if let Some(last) = self.last_write {
            if last.elapsed() < self.interval {
                return Ok(false);
            }
        }
        self.save(position).await?;
        Ok(true)
    }

    /// Saves `position` if it differs from the last saved one, ignoring
    /// the interval.
    pub async fn flush(&mut self, position: LogPosition) -> Result<(), LogRelayError> {
        if self.last_saved == Some(position) {
            return Ok(());
        }
        self.save(position).await
    }

    /// Writes `position` unconditionally.
    pub async fn save(&mut self, position: LogPosition) -> Result<(), LogRelayError> {
        let record = CheckpointRecord {
            source: self.source.clone(),
            log_path: self.log_path.clone(),
            position,
            saved_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.error(format!("create dir failed: {e}")))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| self.error(format!("write failed: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.error(format!("rename failed: {e}")))?;

        tracing::trace!(source = %self.source, offset = position.offset, "checkpoint saved");
        self.last_saved = Some(position);
        self.last_write = Some(Instant::now());
        Ok(())
    }

    fn error(&self, reason: String) -> LogRelayError {
        LogRelayError::Checkpoint {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logrelay_core::types::FileIdentity;

    fn position(offset: u64) -> LogPosition {
        LogPosition::new(Some(FileIdentity { dev: 1, ino: 42 }), offset)
    }

    fn store(dir: &Path, interval: Duration) -> CheckpointStore {
        CheckpointStore::new(
            dir.join("checkpoints").join("tron.json"),
            "tron",
            "/srv/tron/server.log",
            interval,
        )
    }

    #[tokio::test]
    async fn missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path(), Duration::ZERO);
        assert_eq!(s.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path(), Duration::ZERO);
        s.save(position(120)).await.unwrap();
        assert!(s.path().exists());
        assert!(!s.path().with_extension("json.tmp").exists());

        let mut reloaded = store(dir.path(), Duration::ZERO);
        assert_eq!(reloaded.load().await.unwrap(), Some(position(120)));
    }

    #[tokio::test]
    async fn other_log_path_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path(), Duration::ZERO);
        s.save(position(5)).await.unwrap();

        let mut other = CheckpointStore::new(s.path(), "tron", "/srv/other.log", Duration::ZERO);
        assert_eq!(other.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path(), Duration::ZERO);
        std::fs::create_dir_all(s.path().parent().unwrap()).unwrap();
        std::fs::write(s.path(), "{not json").unwrap();
        let err = s.load().await.unwrap_err();
        assert!(matches!(err, LogRelayError::Checkpoint { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn maybe_save_is_throttled() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path(), Duration::from_secs(1));

        assert!(s.maybe_save(position(1)).await.unwrap());
        assert!(!s.maybe_save(position(2)).await.unwrap());
        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(s.maybe_save(position(3)).await.unwrap());
        assert!(!s.maybe_save(position(3)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_ignores_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path(), Duration::from_secs(60));
        s.maybe_save(position(1)).await.unwrap();
        s.flush(position(9)).await.unwrap();

        let mut reloaded = store(dir.path(), Duration::ZERO);
        assert_eq!(reloaded.load().await.unwrap(), Some(position(9)));
    }
}
