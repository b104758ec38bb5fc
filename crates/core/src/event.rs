//! Event model -- the typed result of classifying one log line.
//!
//! [`Event`] is what the classifier produces. [`RelayEvent`] wraps a
//! deliverable event with [`EventMetadata`] so every stage can log the
//! same event id.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SessionId;

/// Event kind, used for metric labels, colours and per-kind toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Player joined
    Join,
    /// Player left
    Leave,
    /// Chat message
    Chat,
    /// Line matched no pattern
    Unmatched,
}

impl EventKind {
    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Chat => "chat",
            Self::Unmatched => "unmatched",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified log line.
///
/// `name` is always resolved by the time an event leaves the classifier;
/// lines that only carried a session id get the tracked name or the
/// `User <id>` fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A player entered the game.
    Join {
        session_id: Option<SessionId>,
        name: String,
        ip: Option<String>,
    },
    /// A player left the game.
    Leave {
        session_id: Option<SessionId>,
        name: String,
    },
    /// A player said something.
    Chat {
        session_id: Option<SessionId>,
        name: String,
        message: String,
    },
    /// The line matched no pattern. Never delivered.
    Unmatched,
}

impl Event {
    /// The event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Join { .. } => EventKind::Join,
            Self::Leave { .. } => EventKind::Leave,
            Self::Chat { .. } => EventKind::Chat,
            Self::Unmatched => EventKind::Unmatched,
        }
    }

    /// The player name, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Join { name, .. } | Self::Leave { name, .. } | Self::Chat { name, .. } => {
                Some(name)
            }
            Self::Unmatched => None,
        }
    }

    /// The session id, if the line carried one.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::Join { session_id, .. }
            | Self::Leave { session_id, .. }
            | Self::Chat { session_id, .. } => *session_id,
            Self::Unmatched => None,
        }
    }

    /// Whether this event may be handed to a sink.
    pub fn is_deliverable(&self) -> bool {
        !matches!(self, Self::Unmatched)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = |sid: &Option<SessionId>| match sid {
            Some(id) => format!("[{id}] "),
            None => String::new(),
        };
        match self {
            Self::Join {
                session_id, name, ..
            } => write!(f, "JOIN  {}{}", id(session_id), name),
            Self::Leave { session_id, name } => write!(f, "LEAVE {}{}", id(session_id), name),
            Self::Chat {
                session_id,
                name,
                message,
            } => write!(f, "CHAT  {}{}: {}", id(session_id), name, message),
            Self::Unmatched => f.write_str("UNMATCHED"),
        }
    }
}

/// Tracing metadata attached to every deliverable event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event id (UUID v4)
    pub id: String,
    /// Name of the source pipeline that produced the event
    pub source: String,
    /// Classification time
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    /// Creates metadata with a fresh id for the given source.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    /// First eight characters of the id, for compact log lines.
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

/// A classified event on its way to a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEvent {
    /// Tracing metadata
    pub metadata: EventMetadata,
    /// The event itself
    pub event: Event,
}

impl RelayEvent {
    /// Wraps an event with fresh metadata.
    pub fn new(source: impl Into<String>, event: Event) -> Self {
        Self {
            metadata: EventMetadata::new(source),
            event,
        }
    }
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RelayEvent[{}] source={} {}",
            self.metadata.short_id(),
            self.metadata.source,
            self.event
        )
    }
}
