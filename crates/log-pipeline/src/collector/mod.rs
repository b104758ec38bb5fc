//! Log collection -- follows a log file and yields decoded lines.
//!
//! [`FileTailer`] is the only collector: one per source, polled from the
//! source's own task. Each emitted [`RawLine`] carries the read position
//! just past it, which is what the checkpoint stores.

pub mod file;

pub use file::{FileTailer, ReopenReason, TailState, TailStep, TailerConfig};

use std::time::SystemTime;

use logrelay_core::types::LogPosition;

/// One decoded, cleaned, non-empty log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Decoded text without terminator or control characters
    pub text: String,
    /// Position just past this line's terminator
    pub position: LogPosition,
    /// Raw byte length including the terminator
    pub byte_len: usize,
    /// When the line was read
    pub read_at: SystemTime,
}

impl RawLine {
    pub fn new(text: impl Into<String>, position: LogPosition, byte_len: usize) -> Self {
        Self {
            text: text.into(),
            position,
            byte_len,
            read_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_line_creation() {
        let line = RawLine::new("[1] a: b", LogPosition::new(None, 9), 9);
        assert_eq!(line.text, "[1] a: b");
        assert_eq!(line.position.offset, 9);
        assert_eq!(line.byte_len, 9);
    }
}
