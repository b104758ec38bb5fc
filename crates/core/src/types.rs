//! Shared domain types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transient numeric handle a game server assigns to a connected client.
pub type SessionId = u32;

/// Stable identity of an open file, used to detect rotation.
///
/// On Unix this is the `(device, inode)` pair. A rotated log keeps its
/// path but gets a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    /// Device number
    pub dev: u64,
    /// Inode number
    pub ino: u64,
}

impl FileIdentity {
    /// Reads the identity from file metadata.
    ///
    /// Returns `None` on platforms without a stable inode.
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    /// Reads the identity from file metadata.
    ///
    /// Returns `None` on platforms without a stable inode.
    #[cfg(not(unix))]
    pub fn from_metadata(_meta: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}

/// Position inside a followed log file.
///
/// `offset` is the number of bytes fully consumed from the file whose
/// identity is `identity`. If `offset` exceeds the current file size the
/// file has been truncated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPosition {
    /// Identity of the file the offset refers to
    pub identity: Option<FileIdentity>,
    /// Consumed byte offset
    pub offset: u64,
}

impl LogPosition {
    /// Creates a position.
    pub fn new(identity: Option<FileIdentity>, offset: u64) -> Self {
        Self { identity, offset }
    }

    /// Whether this position can be resumed against a file with the
    /// given identity and size.
    ///
    /// The offset must not be past the end of the file. Known identities
    /// must be equal; where the platform has none on either side (no
    /// inodes), the size check alone decides.
    pub fn resumable_in(&self, identity: Option<FileIdentity>, size: u64) -> bool {
        match (self.identity, identity) {
            (Some(saved), Some(current)) => saved == current && self.offset <= size,
            (None, None) => self.offset <= size,
            _ => false,
        }
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity {
            Some(id) => write!(f, "{}@{}", id, self.offset),
            None => write!(f, "?@{}", self.offset),
        }
    }
}
