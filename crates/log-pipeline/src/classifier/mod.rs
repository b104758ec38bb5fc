//! Line classification -- turns decoded log lines into [`Event`]s.
//!
//! - [`grammar`]: pattern tables, YAML loading, validation
//! - [`presets`]: built-in grammars
//! - [`heuristic`]: chat speaker filter
//!
//! [`LineClassifier`] owns a grammar and the source's [`SessionTracker`]
//! and applies session side effects as it classifies.

pub mod grammar;
pub mod heuristic;
pub mod presets;

pub use grammar::{Grammar, GrammarSpec, PatternRule, RawMatch, RuleKind, RuleSpec};
pub use heuristic::{DEFAULT_SYSTEM_TOKENS, SpeakerHeuristic};

use std::sync::Arc;

use logrelay_core::event::Event;

use crate::error::LogRelayError;
use crate::session::{SessionTracker, fallback_name};

impl Grammar {
    /// Compiles a built-in preset.
    pub fn preset(name: &str) -> Result<Self, LogRelayError> {
        let spec = presets::preset(name).ok_or_else(|| LogRelayError::Grammar {
            grammar: name.to_owned(),
            reason: format!(
                "unknown preset, expected one of: {}",
                presets::preset_names().join(", ")
            ),
        })?;
        Self::from_spec(spec)
    }
}

/// Neutralizes `@` mentions in outbound text by inserting a zero-width
/// joiner after every `@`.
pub fn sanitize_mentions(text: &str) -> String {
    text.replace('@', "@\u{200d}")
}

/// Classifier for one source.
#[derive(Debug)]
pub struct LineClassifier {
    grammar: Arc<Grammar>,
    sessions: SessionTracker,
}

impl LineClassifier {
    pub fn new(grammar: Arc<Grammar>) -> Self {
        Self {
            grammar,
            sessions: SessionTracker::new(),
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Classifies one line and updates the session table.
    ///
    /// Session updates happen regardless of what the caller later does
    /// with the event.
    pub fn classify(&mut self, line: &str) -> Event {
        let Some(m) = self.grammar.match_line(line) else {
            if line.to_lowercase().contains("entered the game") {
                tracing::debug!(grammar = %self.grammar.name(), line, "join candidate not matched");
            }
            return Event::Unmatched;
        };
        let Some(kind) = m.kind else {
            return Event::Unmatched;
        };

        let event = match kind {
            RuleKind::Join => {
                let name = match (&m.name, m.id) {
                    (Some(name), Some(id)) => {
                        self.sessions.observe_join(id, name);
                        name.clone()
                    }
                    (Some(name), None) => name.clone(),
                    (None, Some(id)) => self.sessions.resolve_or_fallback(id),
                    (None, None) => return Event::Unmatched,
                };
                Event::Join {
                    session_id: m.id,
                    name,
                    ip: m.ip,
                }
            }
            RuleKind::Leave | RuleKind::LeaveById => {
                let tracked = m.id.map(|id| self.sessions.observe_leave(id));
                let name = match (m.name, tracked) {
                    (Some(name), _) => name,
                    (None, Some(tracked)) => tracked,
                    (None, None) => return Event::Unmatched,
                };
                Event::Leave {
                    session_id: m.id,
                    name,
                }
            }
            RuleKind::Chat => {
                let name = match (&m.name, m.id) {
                    (Some(name), Some(id)) => {
                        self.sessions.observe_name(id, name);
                        name.clone()
                    }
                    (Some(name), None) => name.clone(),
                    (None, Some(id)) => self.sessions.resolve_or_fallback(id),
                    (None, None) => return Event::Unmatched,
                };
                Event::Chat {
                    session_id: m.id,
                    name,
                    message: m.message.unwrap_or_default(),
                }
            }
        };

        tracing::debug!(grammar = %self.grammar.name(), event = %event, "classified");
        event
    }

    /// Name for `id`, or the `User <id>` fallback.
    pub fn resolve(&self, id: u32) -> String {
        match self.sessions.get(id) {
            Some(name) => name.to_owned(),
            None => fallback_name(id),
        }
    }
}
