//! Chat speaker heuristic.
//!
//! A generic `[id] name: message` pattern also matches server diagnostics
//! such as `[0] received login from 10.0.0.3: ok`. The heuristic rejects
//! speaker segments that look like system output.

use serde::{Deserialize, Serialize};

/// Words that mark a speaker segment as server output.
pub const DEFAULT_SYSTEM_TOKENS: &[&str] = &[
    "received",
    "login",
    "socket",
    "network",
    "version",
    "id",
    "closing",
    "bound",
    "ping",
    "timestamp",
    "creating",
    "syncing",
    "relabeling",
    "sending",
    "logging",
    "error",
    "downloading",
    "resource",
    "master",
    "done",
    "nobody",
    "charity",
    "poll",
];

fn default_system_tokens() -> Vec<String> {
    DEFAULT_SYSTEM_TOKENS.iter().map(|t| (*t).to_owned()).collect()
}

fn default_true() -> bool {
    true
}

/// Rules for rejecting chat speakers.
///
/// Deserializing an empty map yields [`SpeakerHeuristic::standard`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerHeuristic {
    /// Reject speakers containing an ASCII digit or `.`
    #[serde(default = "default_true")]
    pub reject_digits_and_dots: bool,
    /// Reject speakers containing one of these as a whole word
    #[serde(default = "default_system_tokens")]
    pub system_tokens: Vec<String>,
}

impl SpeakerHeuristic {
    /// Accepts every speaker.
    pub fn disabled() -> Self {
        Self {
            reject_digits_and_dots: false,
            system_tokens: Vec::new(),
        }
    }

    /// Digit/dot rule plus [`DEFAULT_SYSTEM_TOKENS`].
    pub fn standard() -> Self {
        Self {
            reject_digits_and_dots: true,
            system_tokens: default_system_tokens(),
        }
    }

    /// Whether the heuristic can reject anything.
    pub fn is_enabled(&self) -> bool {
        self.reject_digits_and_dots || !self.system_tokens.is_empty()
    }

    /// Whether `speaker` looks like server output rather than a player.
    pub fn looks_like_system(&self, speaker: &str) -> bool {
        let lowered = speaker.to_lowercase();
        if self.reject_digits_and_dots
            && lowered.chars().any(|c| c.is_ascii_digit() || c == '.')
        {
            return true;
        }
        lowered.split_whitespace().any(|word| {
            self.system_tokens
                .iter()
                .any(|token| token.eq_ignore_ascii_case(word))
        })
    }

    /// Applies per-source overrides.
    pub fn with_overrides(
        mut self,
        system_tokens: Option<&[String]>,
        reject_digits_and_dots: Option<bool>,
    ) -> Self {
        if let Some(tokens) = system_tokens {
            self.system_tokens = tokens.to_vec();
        }
        if let Some(reject) = reject_digits_and_dots {
            self.reject_digits_and_dots = reject;
        }
        self
    }
}

impl Default for SpeakerHeuristic {
    fn default() -> Self {
        Self::standard()
    }
}
