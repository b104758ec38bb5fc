//! Hot-reloaded ignore list.
//!
//! One name per line, blank lines and `#` comments skipped, matched
//! case-insensitively on the trimmed name. The file is re-read whenever
//! its modification time or length changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Change stamp of the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

/// Names whose events are never delivered.
#[derive(Debug)]
pub struct IgnoreList {
    path: Option<PathBuf>,
    names: Arc<HashSet<String>>,
    /// `None` while the file is absent or not yet loaded.
    stamp: Option<FileStamp>,
}

impl IgnoreList {
    /// Creates a list backed by `path`. `None` ignores nothing.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            names: Arc::new(HashSet::new()),
            stamp: None,
        }
    }

    /// Whether `name` is on the list, reloading first if the file changed.
    pub async fn is_ignored(&mut self, name: &str) -> bool {
        self.refresh().await;
        let key = name.trim().to_lowercase();
        !key.is_empty() && self.names.contains(&key)
    }

    /// Current set without reloading.
    pub fn snapshot(&self) -> Arc<HashSet<String>> {
        Arc::clone(&self.names)
    }

    /// Re-reads the file if its stamp changed since the last load.
    pub async fn refresh(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(_) => {
                if self.stamp.is_some() || !self.names.is_empty() {
                    tracing::info!(path = %path.display(), "ignore file missing, clearing ignore list");
                }
                self.stamp = None;
                self.names = Arc::new(HashSet::new());
                return;
            }
        };

        let stamp = FileStamp {
            modified: meta.modified().ok(),
            len: meta.len(),
        };
        if self.stamp == Some(stamp) {
            return;
        }

        self.names = Arc::new(load_names(&path).await);
        self.stamp = Some(stamp);
        tracing::info!(
            path = %path.display(),
            count = self.names.len(),
            "loaded ignore list"
        );
    }
}

async fn load_names(path: &Path) -> HashSet<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => parse_names(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read ignore file");
            HashSet::new()
        }
    }
}

/// Parses ignore file content into lowercase names.
pub fn parse_names(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}
