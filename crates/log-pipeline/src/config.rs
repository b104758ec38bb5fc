//! Runtime configuration for one source pipeline.
//!
//! [`SourcePipelineConfig`] is derived from the core
//! [`SourceConfig`](logrelay_core::config::SourceConfig) plus the daemon's
//! [`GeneralConfig`](logrelay_core::config::GeneralConfig): millisecond
//! fields become `Duration`s and the checkpoint path is resolved.
//!
//! # Example
//! ```ignore
//! use logrelay_core::config::RelayConfig;
//! use logrelay_pipeline::config::SourcePipelineConfig;
//!
//! let core = RelayConfig::load("logrelay.toml").await?;
//! for source in core.enabled_sources() {
//!     let config = SourcePipelineConfig::from_core(source, &core.general);
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use logrelay_core::config::{GeneralConfig, MessageStyle, MessageTemplates, SourceConfig};

use crate::classifier::Grammar;
use crate::collector::TailerConfig;
use crate::error::LogRelayError;
use crate::sink::SinkConfig;

/// Where a source's grammar comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarSource {
    /// Built-in preset name
    Preset(String),
    /// YAML grammar file
    File(PathBuf),
}

impl std::fmt::Display for GrammarSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preset(name) => write!(f, "preset:{name}"),
            Self::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

/// Settings for one [`RelayPipeline`](crate::pipeline::RelayPipeline).
#[derive(Debug, Clone)]
pub struct SourcePipelineConfig {
    pub name: String,
    pub grammar: GrammarSource,
    /// Replaces the grammar's speaker heuristic tokens
    pub system_tokens: Option<Vec<String>>,
    /// Replaces the grammar's digit/dot rule
    pub reject_digits_and_dots: Option<bool>,
    pub ignore_file: Option<PathBuf>,
    /// `None` classifies without delivering
    pub webhook_url: Option<String>,
    pub server_name: String,
    pub templates: MessageTemplates,
    pub post_joins: bool,
    pub post_leaves: bool,
    pub post_chat: bool,
    pub startup_test_post: bool,
    /// `None` disables checkpointing
    pub checkpoint_path: Option<PathBuf>,
    pub checkpoint_interval: Duration,
    pub tail: TailerConfig,
    pub sink: SinkConfig,
}

impl Default for SourcePipelineConfig {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            grammar: GrammarSource::Preset("armagetron".to_owned()),
            system_tokens: None,
            reject_digits_and_dots: None,
            ignore_file: None,
            webhook_url: None,
            server_name: "default".to_owned(),
            templates: MessageTemplates::default(),
            post_joins: true,
            post_leaves: true,
            post_chat: true,
            startup_test_post: false,
            checkpoint_path: None,
            checkpoint_interval: Duration::from_secs(1),
            tail: TailerConfig::new("default", ""),
            sink: SinkConfig::default(),
        }
    }
}

impl SourcePipelineConfig {
    /// Derives runtime settings from the core config.
    pub fn from_core(source: &SourceConfig, general: &GeneralConfig) -> Self {
        let grammar = match &source.grammar_file {
            Some(path) => GrammarSource::File(PathBuf::from(path)),
            None => GrammarSource::Preset(source.grammar.clone()),
        };
        let checkpoint_path = source.checkpoint.then(|| {
            PathBuf::from(&general.data_dir)
                .join("checkpoints")
                .join(format!("{}.json", source.name))
        });
        let webhook_url = (!source.webhook_url.trim().is_empty())
            .then(|| source.webhook_url.trim().to_owned());

        Self {
            name: source.name.clone(),
            grammar,
            system_tokens: source.system_tokens.clone(),
            reject_digits_and_dots: source.reject_digits_and_dots,
            ignore_file: source.ignore_file.as_ref().map(PathBuf::from),
            webhook_url,
            server_name: source.display_server().to_owned(),
            templates: source.templates.clone(),
            post_joins: source.post_joins,
            post_leaves: source.post_leaves,
            post_chat: source.post_chat,
            startup_test_post: source.startup_test_post,
            checkpoint_path,
            checkpoint_interval: Duration::from_millis(general.checkpoint_interval_ms),
            tail: TailerConfig {
                source: source.name.clone(),
                path: PathBuf::from(&source.log_path),
                start_at_end: source.start_at_end,
                replay_tail_bytes: source.replay_tail_kb.saturating_mul(1024),
                poll_interval: Duration::from_millis(source.poll_interval_ms),
                error_backoff: Duration::from_millis(source.error_backoff_ms),
                max_line_bytes: source.max_line_bytes,
            },
            sink: SinkConfig {
                source: source.name.clone(),
                max_message_chars: source.max_message_chars,
                request_timeout: Duration::from_secs(source.request_timeout_secs),
                rate_limit_fallback: Duration::from_millis(source.rate_limit_fallback_ms),
                max_retry_after: Duration::from_secs(source.max_retry_after_secs),
                retry_on_rate_limit: source.retry_on_rate_limit,
                style: source.message_style,
                username: source.username.clone(),
            },
        }
    }

    /// Checks values the pipeline relies on.
    pub fn validate(&self) -> Result<(), LogRelayError> {
        let invalid = |field: &str, reason: &str| LogRelayError::Config {
            field: field.to_owned(),
            reason: reason.to_owned(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be empty"));
        }
        if self.tail.path.as_os_str().is_empty() {
            return Err(invalid("log_path", "must not be empty"));
        }
        if self.tail.poll_interval.is_zero() {
            return Err(invalid("poll_interval_ms", "must be greater than 0"));
        }
        if self.tail.error_backoff.is_zero() {
            return Err(invalid("error_backoff_ms", "must be greater than 0"));
        }
        if self.tail.max_line_bytes < 2 {
            return Err(invalid("max_line_bytes", "must be at least 2"));
        }
        if self.sink.max_message_chars < 2 {
            return Err(invalid("max_message_chars", "must be at least 2"));
        }
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(invalid("webhook_url", "scheme must be http or https"));
            }
        }
        Ok(())
    }

    /// Compiles or loads the grammar and applies heuristic overrides.
    pub async fn load_grammar(&self) -> Result<Grammar, LogRelayError> {
        let grammar = match &self.grammar {
            GrammarSource::Preset(name) => Grammar::preset(name)?,
            GrammarSource::File(path) => Grammar::load_file(path).await?,
        };
        if self.system_tokens.is_none() && self.reject_digits_and_dots.is_none() {
            return Ok(grammar);
        }
        let heuristic = grammar
            .heuristic()
            .clone()
            .with_overrides(self.system_tokens.as_deref(), self.reject_digits_and_dots);
        Ok(grammar.with_heuristic(heuristic))
    }
}

/// Builder for [`SourcePipelineConfig`].
#[derive(Default)]
pub struct SourcePipelineConfigBuilder {
    config: SourcePipelineConfig,
}

impl SourcePipelineConfigBuilder {
    /// New builder for a source following `log_path`.
    pub fn new(name: impl Into<String>, log_path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let mut config = SourcePipelineConfig {
            name: name.clone(),
            server_name: name.clone(),
            tail: TailerConfig::new(name.clone(), log_path),
            ..SourcePipelineConfig::default()
        };
        config.sink.source = name;
        Self { config }
    }

    pub fn grammar_preset(mut self, name: impl Into<String>) -> Self {
        self.config.grammar = GrammarSource::Preset(name.into());
        self
    }

    pub fn grammar_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.grammar = GrammarSource::File(path.into());
        self
    }

    pub fn system_tokens(mut self, tokens: Vec<String>) -> Self {
        self.config.system_tokens = Some(tokens);
        self
    }

    pub fn reject_digits_and_dots(mut self, reject: bool) -> Self {
        self.config.reject_digits_and_dots = Some(reject);
        self
    }

    pub fn ignore_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ignore_file = Some(path.into());
        self
    }

    pub fn webhook_url(mut self, url: impl Into<String>) -> Self {
        self.config.webhook_url = Some(url.into());
        self
    }

    pub fn server_name(mut self, server: impl Into<String>) -> Self {
        self.config.server_name = server.into();
        self
    }

    pub fn templates(mut self, templates: MessageTemplates) -> Self {
        self.config.templates = templates;
        self
    }

    /// Per-kind delivery toggles.
    pub fn post(mut self, joins: bool, leaves: bool, chat: bool) -> Self {
        self.config.post_joins = joins;
        self.config.post_leaves = leaves;
        self.config.post_chat = chat;
        self
    }

    pub fn startup_test_post(mut self, enabled: bool) -> Self {
        self.config.startup_test_post = enabled;
        self
    }

    pub fn checkpoint(mut self, path: impl Into<PathBuf>, interval: Duration) -> Self {
        self.config.checkpoint_path = Some(path.into());
        self.config.checkpoint_interval = interval;
        self
    }

    pub fn start_at_end(mut self, start_at_end: bool) -> Self {
        self.config.tail.start_at_end = start_at_end;
        self
    }

    pub fn replay_tail_bytes(mut self, bytes: u64) -> Self {
        self.config.tail.replay_tail_bytes = bytes;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.tail.poll_interval = interval;
        self
    }

    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.config.tail.error_backoff = backoff;
        self
    }

    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.config.tail.max_line_bytes = bytes;
        self
    }

    pub fn message_style(mut self, style: MessageStyle) -> Self {
        self.config.sink.style = style;
        self
    }

    pub fn rate_limit(mut self, fallback: Duration, max_wait: Duration, retry: bool) -> Self {
        self.config.sink.rate_limit_fallback = fallback;
        self.config.sink.max_retry_after = max_wait;
        self.config.sink.retry_on_rate_limit = retry;
        self
    }

    pub fn max_message_chars(mut self, chars: usize) -> Self {
        self.config.sink.max_message_chars = chars;
        self
    }

    /// Validates and returns the config.
    pub fn build(self) -> Result<SourcePipelineConfig, LogRelayError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
