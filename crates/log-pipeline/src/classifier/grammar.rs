//! Grammar -- an ordered table of line patterns.
//!
//! A [`GrammarSpec`] is plain data (built-in preset or YAML file). It is
//! compiled into a [`Grammar`], which validates every pattern up front so
//! a bad grammar fails at startup instead of on the first line.
//!
//! # YAML format
//! ```yaml
//! name: mygame
//! case_insensitive: true
//! strip_color_codes: false
//! heuristic:               # optional; omit to accept every chat speaker
//!   reject_digits_and_dots: true
//! rules:
//!   - kind: join
//!     pattern: '^\[(?P<id>\d+)\] (?P<name>.+) joined$'
//!   - kind: chat
//!     pattern: '^\[(?P<id>\d+)\] (?P<name>[^:]+): (?P<message>.*)$'
//! ```

use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use logrelay_core::types::SessionId;

use super::heuristic::SpeakerHeuristic;
use crate::error::LogRelayError;

const MAX_GRAMMAR_FILE_SIZE: u64 = 1024 * 1024;
const MAX_RULES: usize = 256;

/// What a matching rule means.
///
/// Declaration order within the enum is evaluation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Join,
    Leave,
    /// Leave that carries only the session id (logout, kick)
    LeaveById,
    Chat,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::LeaveById => "leave_by_id",
            Self::Chat => "chat",
        }
    }
}

/// One uncompiled rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub kind: RuleKind,
    pub pattern: String,
}

impl RuleSpec {
    pub fn new(kind: RuleKind, pattern: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
        }
    }
}

/// Grammar as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarSpec {
    pub name: String,
    #[serde(default)]
    pub case_insensitive: bool,
    /// Remove Quake-style `^N` colour codes from names and messages
    #[serde(default)]
    pub strip_color_codes: bool,
    /// Chat speaker filter; absent means no filtering
    #[serde(default)]
    pub heuristic: Option<SpeakerHeuristic>,
    pub rules: Vec<RuleSpec>,
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub kind: RuleKind,
    pub regex: Regex,
}

/// Captures from the first rule that matched a line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMatch {
    pub kind: Option<RuleKind>,
    pub id: Option<SessionId>,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub message: Option<String>,
}

/// Compiled, validated grammar.
#[derive(Debug, Clone)]
pub struct Grammar {
    name: String,
    rules: Vec<PatternRule>,
    heuristic: SpeakerHeuristic,
    strip_color_codes: bool,
}

impl Grammar {
    /// Compiles and validates a spec.
    ///
    /// Rules are reordered by kind priority, keeping declaration order
    /// within a kind.
    pub fn from_spec(spec: GrammarSpec) -> Result<Self, LogRelayError> {
        let grammar_err = |reason: String| LogRelayError::Grammar {
            grammar: spec.name.clone(),
            reason,
        };

        if spec.name.trim().is_empty() {
            return Err(grammar_err("name must not be empty".to_owned()));
        }
        if spec.rules.is_empty() {
            return Err(grammar_err("no rules".to_owned()));
        }
        if spec.rules.len() > MAX_RULES {
            return Err(grammar_err(format!("too many rules: max {MAX_RULES}")));
        }

        let mut rules = Vec::with_capacity(spec.rules.len());
        for (idx, rule) in spec.rules.iter().enumerate() {
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(spec.case_insensitive)
                .build()
                .map_err(|e| grammar_err(format!("rules[{idx}]: invalid regex: {e}")))?;

            let groups: Vec<&str> = regex.capture_names().flatten().collect();
            let has = |g: &str| groups.contains(&g);
            if !has("name") && !has("id") {
                return Err(grammar_err(format!(
                    "rules[{idx}] ({}): needs a 'name' or 'id' group",
                    rule.kind.as_str()
                )));
            }
            if rule.kind == RuleKind::Chat && !has("message") {
                return Err(grammar_err(format!(
                    "rules[{idx}] (chat): needs a 'message' group"
                )));
            }
            if rule.kind == RuleKind::LeaveById && !has("id") {
                return Err(grammar_err(format!(
                    "rules[{idx}] (leave_by_id): needs an 'id' group"
                )));
            }

            rules.push(PatternRule {
                kind: rule.kind,
                regex,
            });
        }
        rules.sort_by_key(|r| r.kind);

        Ok(Self {
            name: spec.name,
            rules,
            heuristic: spec.heuristic.unwrap_or_else(SpeakerHeuristic::disabled),
            strip_color_codes: spec.strip_color_codes,
        })
    }

    /// Parses and compiles a YAML grammar.
    pub fn from_yaml(yaml: &str, origin: &str) -> Result<Self, LogRelayError> {
        let spec: GrammarSpec =
            serde_yaml::from_str(yaml).map_err(|e| LogRelayError::Grammar {
                grammar: origin.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;
        Self::from_spec(spec)
    }

    /// Loads a YAML grammar file.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Self, LogRelayError> {
        let path = path.as_ref();
        let origin = path.display().to_string();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| LogRelayError::Grammar {
                grammar: origin.clone(),
                reason: format!("failed to read file metadata: {e}"),
            })?;
        if metadata.len() > MAX_GRAMMAR_FILE_SIZE {
            return Err(LogRelayError::Grammar {
                grammar: origin,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_GRAMMAR_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| LogRelayError::Grammar {
                    grammar: origin.clone(),
                    reason: format!("failed to read file: {e}"),
                })?;
        Self::from_yaml(&content, &origin)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn heuristic(&self) -> &SpeakerHeuristic {
        &self.heuristic
    }

    pub fn strips_color_codes(&self) -> bool {
        self.strip_color_codes
    }

    /// Replaces the chat speaker heuristic.
    pub fn with_heuristic(mut self, heuristic: SpeakerHeuristic) -> Self {
        self.heuristic = heuristic;
        self
    }

    /// Runs the rules against `line` and returns the first accepted match.
    ///
    /// A chat match whose speaker fails the heuristic is skipped and
    /// evaluation continues with the next rule.
    pub fn match_line(&self, line: &str) -> Option<RawMatch> {
        for rule in &self.rules {
            let Some(caps) = rule.regex.captures(line) else {
                continue;
            };

            let text = |group: &str| caps.name(group).map(|m| m.as_str());

            let clean = |s: &str| {
                let s = if self.strip_color_codes {
                    strip_color_codes(s)
                } else {
                    s.to_owned()
                };
                s.trim().to_owned()
            };
            let name = text("name").map(clean);

            // judged on the cleaned name: `^1` colour codes carry digits
            if rule.kind == RuleKind::Chat {
                let rejected = name
                    .as_deref()
                    .is_some_and(|s| self.heuristic.looks_like_system(s));
                if rejected {
                    tracing::debug!(grammar = %self.name, line, "rejected system-looking chat");
                    continue;
                }
            }

            return Some(RawMatch {
                kind: Some(rule.kind),
                id: text("id").and_then(|id| id.parse().ok()),
                name: name.filter(|n| !n.is_empty()),
                ip: text("ip").map(str::to_owned).filter(|ip| !ip.is_empty()),
                message: text("message").map(clean),
            });
        }
        None
    }
}

/// Removes `^0`..`^9` colour codes.
pub fn strip_color_codes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '^' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(rules: Vec<RuleSpec>) -> GrammarSpec {
        GrammarSpec {
            name: "test".to_owned(),
            case_insensitive: false,
            strip_color_codes: false,
            heuristic: None,
            rules,
        }
    }

    #[test]
    fn rules_sorted_by_priority_stable_within_kind() {
        let grammar = Grammar::from_spec(spec(vec![
            RuleSpec::new(RuleKind::Chat, r"^(?P<name>\w+): (?P<message>.*)$"),
            RuleSpec::new(RuleKind::LeaveById, r"^kick (?P<id>\d+)$"),
            RuleSpec::new(RuleKind::Join, r"^(?P<name>\w+) joined a$"),
            RuleSpec::new(RuleKind::Join, r"^(?P<name>\w+) joined b$"),
        ]))
        .unwrap();

        let kinds: Vec<_> = grammar.rules().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RuleKind::Join,
                RuleKind::Join,
                RuleKind::LeaveById,
                RuleKind::Chat
            ]
        );
        assert!(grammar.rules()[0].regex.as_str().ends_with("joined a$"));
    }

    #[test]
    fn join_wins_over_chat_regardless_of_order() {
        let grammar = Grammar::from_spec(spec(vec![
            RuleSpec::new(RuleKind::Chat, r"^(?P<name>[^:]+): (?P<message>.*)$"),
            RuleSpec::new(RuleKind::Join, r"^Server: (?P<name>.+) joined the game\.$"),
        ]))
        .unwrap();
        let m = grammar.match_line("Server: Alice joined the game.").unwrap();
        assert_eq!(m.kind, Some(RuleKind::Join));
        assert_eq!(m.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn rejects_invalid_regex() {
        let err = Grammar::from_spec(spec(vec![RuleSpec::new(RuleKind::Join, "(?P<name>")]))
            .unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn rejects_chat_without_message_group() {
        let err = Grammar::from_spec(spec(vec![RuleSpec::new(
            RuleKind::Chat,
            r"^(?P<name>\w+): .*$",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn rejects_leave_by_id_without_id_group() {
        let err = Grammar::from_spec(spec(vec![RuleSpec::new(
            RuleKind::LeaveById,
            r"^(?P<name>\w+) kicked$",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn rejects_rule_without_name_or_id() {
        let err = Grammar::from_spec(spec(vec![RuleSpec::new(RuleKind::Join, r"^joined$")]))
            .unwrap_err();
        assert!(err.to_string().contains("'name' or 'id'"));
    }

    #[test]
    fn rejects_empty_rule_list() {
        assert!(Grammar::from_spec(spec(vec![])).is_err());
    }

    #[test]
    fn heuristic_skips_to_later_rules() {
        let mut s = spec(vec![
            RuleSpec::new(RuleKind::Chat, r"^(?P<name>[^:]+): (?P<message>.*)$"),
            RuleSpec::new(RuleKind::Chat, r"^(?P<name>[^:]+): (?P<message>.*)$"),
        ]);
        s.heuristic = Some(SpeakerHeuristic::standard());
        let grammar = Grammar::from_spec(s).unwrap();
        assert!(grammar.match_line("10.0.0.1: connected").is_none());
        assert!(grammar.match_line("Alice: hi").is_some());
    }

    #[test]
    fn heuristic_sees_colour_stripped_speaker() {
        let mut s = crate::classifier::presets::preset("quake3").unwrap();
        s.heuristic = Some(SpeakerHeuristic::standard());
        let grammar = Grammar::from_spec(s).unwrap();

        let m = grammar.match_line("say: ^1Alice^7: hello").unwrap();
        assert_eq!(m.kind, Some(RuleKind::Chat));
        assert_eq!(m.name.as_deref(), Some("Alice"));
        assert_eq!(m.message.as_deref(), Some("hello"));

        // digits outside colour codes still count
        assert!(grammar.match_line("say: ^1Bot42^7: hello").is_none());
    }

    #[test]
    fn yaml_grammar_loads() {
        let yaml = r#"
name: custom
case_insensitive: true
strip_color_codes: true
heuristic:
  reject_digits_and_dots: false
rules:
  - kind: join
    pattern: '^(?P<name>.+) JOINED$'
  - kind: chat
    pattern: '^<(?P<name>[^>]+)> (?P<message>.*)$'
"#;
        let grammar = Grammar::from_yaml(yaml, "custom.yaml").unwrap();
        assert_eq!(grammar.name(), "custom");
        assert!(grammar.strips_color_codes());
        assert!(!grammar.heuristic().reject_digits_and_dots);
        assert!(!grammar.heuristic().system_tokens.is_empty());

        let m = grammar.match_line("^1Ali^7ce joined").unwrap();
        assert_eq!(m.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn yaml_unknown_kind_fails() {
        let yaml = "name: x\nrules:\n  - kind: teleport\n    pattern: '(?P<name>.*)'\n";
        assert!(Grammar::from_yaml(yaml, "x.yaml").is_err());
    }

    #[test]
    fn id_overflow_is_dropped() {
        let grammar = Grammar::from_spec(spec(vec![RuleSpec::new(
            RuleKind::Join,
            r"^\[(?P<id>\d+)\] (?P<name>\w+) joined$",
        )]))
        .unwrap();
        let m = grammar.match_line("[99999999999] Bob joined").unwrap();
        assert_eq!(m.id, None);
        assert_eq!(m.name.as_deref(), Some("Bob"));
    }

    #[test]
    fn strip_color_codes_removes_digits_only() {
        assert_eq!(strip_color_codes("^1Red^7Name^"), "RedName^");
        assert_eq!(strip_color_codes("a^xb"), "a^xb");
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        assert!(Grammar::load_file("/nonexistent/grammar.yaml").await.is_err());
    }
}
