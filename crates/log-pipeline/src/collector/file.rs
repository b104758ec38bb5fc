//! File tail follower.
//!
//! Follows one log file the way `tail -F` does, polling for growth.
//!
//! # State machine
//! ```text
//!            open ok                 no data, file unchanged
//! Closed ───────────▶ Open ◀──────────────────────▶ AtEofWaiting
//!   ▲  ▲                │ rotated / truncated             │
//!   │  └────────────────┴─────────────────────────────────┘
//!   │ retry             │ I/O error, file missing
//!   └── ErrorBackoff ◀──┘
//! ```
//!
//! # Start offset
//! - first open: checkpoint position if it still matches the file, else
//!   end of file (`start_at_end`), else the last `replay_tail_bytes`
//!   with the first partial line discarded
//! - after rotation or truncation: offset 0 of the new content
//! - after an error: the last consumed offset if the file is unchanged,
//!   else offset 0

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use logrelay_core::metrics as m;
use logrelay_core::types::{FileIdentity, LogPosition};

use super::RawLine;
use crate::decoder::{Encoding, LineDecoder};

/// Bytes read from offset 0 for encoding detection.
const SAMPLE_LEN: usize = 4096;

/// Bytes requested per read call.
const READ_CHUNK: usize = 8192;

/// Tail follower settings.
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// Source name, used as a metric label
    pub source: String,
    pub path: PathBuf,
    pub start_at_end: bool,
    pub replay_tail_bytes: u64,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub max_line_bytes: usize,
}

impl TailerConfig {
    /// Settings with the relay defaults for `path`.
    pub fn new(source: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
            start_at_end: false,
            replay_tail_bytes: 64 * 1024,
            poll_interval: Duration::from_millis(200),
            error_backoff: Duration::from_millis(500),
            max_line_bytes: 64 * 1024,
        }
    }
}

/// Tail follower state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Closed,
    Open,
    AtEofWaiting,
    ErrorBackoff,
}

impl TailState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::AtEofWaiting => "at_eof",
            Self::ErrorBackoff => "error_backoff",
        }
    }
}

/// Why the file was closed and reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReopenReason {
    /// Path now refers to a different file
    Rotated,
    /// File shrank below the read offset
    Truncated,
}

impl ReopenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rotated => "rotated",
            Self::Truncated => "truncated",
        }
    }
}

/// Result of one [`FileTailer::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailStep {
    /// A complete line
    Line(RawLine),
    /// The file was opened at this position
    Opened(LogPosition),
    /// Nothing new; caller should wait `poll_interval`
    Idle,
    /// The file was closed and will be reopened on the next step
    Reopen(ReopenReason),
    /// An error closed the file; caller should wait `error_backoff`
    Backoff(String),
}

/// Where the next open should start.
#[derive(Debug, Clone, Copy)]
enum StartMode {
    /// First open, with an optional saved position
    Initial(Option<LogPosition>),
    /// Continue from a position if the file is unchanged
    Resume(LogPosition),
    /// Read from offset 0
    Beginning,
}

/// Follows one log file across rotation and truncation.
#[derive(Debug)]
pub struct FileTailer {
    config: TailerConfig,
    state: TailState,
    file: Option<File>,
    decoder: LineDecoder,
    /// Bytes read but not yet emitted as lines
    buf: BytesMut,
    read_buf: Vec<u8>,
    identity: Option<FileIdentity>,
    /// File offset of the end of `buf`
    read_offset: u64,
    start_mode: StartMode,
    discard_partial: bool,
    /// Drop a leading `00` left by a mid-stream switch to UTF-16LE
    skip_nul: bool,
    opened_once: bool,
}

impl FileTailer {
    /// Creates a closed tailer.
    ///
    /// `resume_from` is a saved position, honoured on the first open
    /// only if the file identity matches and the offset is within the file.
    pub fn new(config: TailerConfig, resume_from: Option<LogPosition>) -> Self {
        Self {
            config,
            state: TailState::Closed,
            file: None,
            decoder: LineDecoder::new(),
            buf: BytesMut::with_capacity(READ_CHUNK),
            read_buf: vec![0; READ_CHUNK],
            identity: None,
            read_offset: 0,
            start_mode: StartMode::Initial(resume_from),
            discard_partial: false,
            skip_nul: false,
            opened_once: false,
        }
    }

    pub fn config(&self) -> &TailerConfig {
        &self.config
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    /// Detected encoding of the open file.
    pub fn encoding(&self) -> Option<Encoding> {
        self.decoder.encoding()
    }

    /// Position just past the last emitted (or discarded) line.
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.identity, self.consumed_offset())
    }

    fn consumed_offset(&self) -> u64 {
        self.read_offset.saturating_sub(self.buf.len() as u64)
    }

    /// Waits for the next line, sleeping while idle or backing off.
    pub async fn next_line(&mut self) -> RawLine {
        loop {
            match self.step().await {
                TailStep::Line(line) => return line,
                TailStep::Idle => tokio::time::sleep(self.config.poll_interval).await,
                TailStep::Backoff(_) => tokio::time::sleep(self.config.error_backoff).await,
                TailStep::Opened(_) | TailStep::Reopen(_) => {}
            }
        }
    }

    /// Performs one state transition without sleeping.
    pub async fn step(&mut self) -> TailStep {
        match self.state {
            TailState::Closed | TailState::ErrorBackoff => match self.open().await {
                Ok(position) => TailStep::Opened(position),
                Err(e) => self.enter_backoff(format!("open failed: {e}")),
            },
            TailState::Open | TailState::AtEofWaiting => self.read_step().await,
        }
    }

    async fn open(&mut self) -> std::io::Result<LogPosition> {
        let path = &self.config.path;
        let mut file = File::open(path).await?;
        let meta = file.metadata().await?;
        let identity = FileIdentity::from_metadata(&meta);
        let size = meta.len();

        self.decoder.reset();
        let mut sample = Vec::with_capacity(SAMPLE_LEN);
        (&mut file)
            .take(SAMPLE_LEN as u64)
            .read_to_end(&mut sample)
            .await?;
        // an empty file leaves the encoding to the first bytes written
        let unit = self.decoder.observe_sample(&sample).unit_len() as u64;

        let (start, discard) = match self.start_mode {
            StartMode::Initial(Some(saved)) if saved.resumable_in(identity, size) => {
                (saved.offset, false)
            }
            StartMode::Initial(_) => {
                if self.config.start_at_end {
                    (align_down(size, unit), false)
                } else if size > self.config.replay_tail_bytes {
                    (align_down(size - self.config.replay_tail_bytes, unit), true)
                } else {
                    (0, false)
                }
            }
            StartMode::Resume(saved) if saved.resumable_in(identity, size) => {
                // a resume point may sit on the stray 00 of a split terminator
                let aligned = align_up(saved.offset, unit);
                (if aligned <= size { aligned } else { saved.offset }, false)
            }
            StartMode::Resume(_) | StartMode::Beginning => (0, false),
        };

        file.seek(SeekFrom::Start(start)).await?;

        self.file = Some(file);
        self.identity = identity;
        self.read_offset = start;
        self.buf.clear();
        self.discard_partial = discard;
        self.skip_nul = false;
        self.state = TailState::Open;
        self.opened_once = true;

        let position = self.position();
        tracing::info!(
            source = %self.config.source,
            path = %self.config.path.display(),
            encoding = %self
                .decoder
                .encoding()
                .map_or_else(|| "undetected".to_owned(), |e| e.to_string()),
            size,
            offset = start,
            "opened log file"
        );
        Ok(position)
    }

    async fn read_step(&mut self) -> TailStep {
        loop {
            if self.decoder.encoding().is_none() && self.buf.len() >= 2 {
                let sample_len = self.buf.len().min(SAMPLE_LEN);
                let encoding = self.decoder.observe_sample(&self.buf[..sample_len]);
                tracing::info!(
                    source = %self.config.source,
                    encoding = %encoding,
                    "detected encoding from first bytes"
                );
            }
            if self.skip_nul && !self.buf.is_empty() {
                if self.buf[0] == 0 {
                    self.buf.advance(1);
                }
                self.skip_nul = false;
            }

            if let Some(bytes) = self.take_line() {
                if self.discard_partial {
                    self.discard_partial = false;
                    continue;
                }
                let text = self.decoder.decode_line(&bytes);
                if self.decoder.take_realign() {
                    self.skip_nul = true;
                }
                if text.trim().is_empty() {
                    continue;
                }
                self.state = TailState::Open;
                metrics::counter!(m::TAIL_LINES_READ_TOTAL, m::LABEL_SOURCE => self.config.source.clone())
                    .increment(1);
                return TailStep::Line(RawLine::new(text, self.position(), bytes.len()));
            }

            let Some(file) = self.file.as_mut() else {
                self.state = TailState::Closed;
                return TailStep::Reopen(ReopenReason::Rotated);
            };
            match file.read(&mut self.read_buf).await {
                Ok(0) => return self.check_at_eof().await,
                Ok(n) => {
                    self.buf.extend_from_slice(&self.read_buf[..n]);
                    self.read_offset += n as u64;
                }
                Err(e) => return self.enter_backoff(format!("read failed: {e}")),
            }
        }
    }

    /// Splits the next complete (or over-long) line off the buffer.
    fn take_line(&mut self) -> Option<bytes::Bytes> {
        if let Some(end) = self.decoder.find_line_end(&self.buf) {
            return Some(self.buf.split_to(end).freeze());
        }
        if self.buf.len() >= self.config.max_line_bytes {
            let unit = self.decoder.active().unit_len();
            let len = self.config.max_line_bytes.max(unit) / unit * unit;
            tracing::warn!(
                source = %self.config.source,
                bytes = len,
                "line exceeds max_line_bytes, flushing partial line"
            );
            return Some(self.buf.split_to(len).freeze());
        }
        None
    }

    async fn check_at_eof(&mut self) -> TailStep {
        self.state = TailState::AtEofWaiting;
        let meta = match tokio::fs::metadata(&self.config.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self.enter_backoff("log file missing".to_owned());
            }
            Err(e) => return self.enter_backoff(format!("stat failed: {e}")),
        };

        let current = FileIdentity::from_metadata(&meta);
        if self.identity.is_some() && current != self.identity {
            return self.reopen(ReopenReason::Rotated);
        }
        if self.read_offset > meta.len() {
            return self.reopen(ReopenReason::Truncated);
        }
        TailStep::Idle
    }

    fn reopen(&mut self, reason: ReopenReason) -> TailStep {
        tracing::info!(
            source = %self.config.source,
            path = %self.config.path.display(),
            reason = reason.as_str(),
            "log rotated or truncated, reopening"
        );
        metrics::counter!(
            m::TAIL_REOPENS_TOTAL,
            m::LABEL_SOURCE => self.config.source.clone(),
            m::LABEL_REASON => reason.as_str()
        )
        .increment(1);
        self.close();
        self.start_mode = StartMode::Beginning;
        self.state = TailState::Closed;
        TailStep::Reopen(reason)
    }

    fn enter_backoff(&mut self, reason: String) -> TailStep {
        if self.opened_once && self.file.is_some() {
            self.start_mode = StartMode::Resume(self.position());
        }
        tracing::warn!(
            source = %self.config.source,
            path = %self.config.path.display(),
            reason = %reason,
            backoff_ms = self.config.error_backoff.as_millis() as u64,
            "tail error, backing off"
        );
        metrics::counter!(m::TAIL_ERRORS_TOTAL, m::LABEL_SOURCE => self.config.source.clone())
            .increment(1);
        self.close();
        self.state = TailState::ErrorBackoff;
        TailStep::Backoff(reason)
    }

    fn close(&mut self) {
        self.file = None;
        self.read_offset = self.consumed_offset();
        self.buf.clear();
        self.discard_partial = false;
    }
}

fn align_down(offset: u64, unit: u64) -> u64 {
    offset - offset % unit
}

fn align_up(offset: u64, unit: u64) -> u64 {
    align_down(offset + unit - 1, unit)
}
