//! Configuration -- `logrelay.toml` parsing and runtime settings.
//!
//! [`RelayConfig`] is the top-level structure holding daemon settings and
//! one [`SourceConfig`] per followed log file.
//!
//! # Precedence
//! 1. CLI flags (daemon `--log-level` / `--log-format`)
//! 2. Environment variables (`LOGRELAY_GENERAL_LOG_LEVEL=debug`)
//! 3. Config file
//! 4. `Default` impls
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), logrelay_core::error::RelayError> {
//! use logrelay_core::config::RelayConfig;
//!
//! let config = RelayConfig::load("logrelay.toml").await?;
//!
//! let config = RelayConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, RelayError};

/// Names of the built-in grammar presets.
pub const GRAMMAR_PRESETS: &[&str] = &[
    "armagetron",
    "quake3",
    "halflife",
    "aceofspades",
    "doom3",
    "minecraft-beta",
    "mumble",
];

/// Top-level logrelay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Daemon settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Prometheus exporter settings
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Followed log files
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl RelayConfig {
    /// Reads the file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the file without environment overrides or
    /// validation.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                RelayError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, RelayError> {
        toml::from_str(toml_str).map_err(|e| {
            RelayError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Applies `LOGRELAY_*` environment overrides.
    ///
    /// Global keys follow `LOGRELAY_{SECTION}_{FIELD}`. Per-source keys use
    /// the source name uppercased with `-` mapped to `_`:
    /// `LOGRELAY_SOURCE_TRON_MAIN_WEBHOOK_URL`.
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "LOGRELAY_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGRELAY_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "LOGRELAY_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "LOGRELAY_GENERAL_PID_FILE");
        override_u64(
            &mut self.general.checkpoint_interval_ms,
            "LOGRELAY_GENERAL_CHECKPOINT_INTERVAL_MS",
        );

        override_bool(&mut self.metrics.enabled, "LOGRELAY_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGRELAY_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGRELAY_METRICS_PORT");

        for source in &mut self.sources {
            let prefix = source.env_prefix();
            override_string(&mut source.webhook_url, &format!("{prefix}_WEBHOOK_URL"));
            override_string(&mut source.log_path, &format!("{prefix}_LOG_PATH"));
            override_bool(&mut source.enabled, &format!("{prefix}_ENABLED"));
        }
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), RelayError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.general.checkpoint_interval_ms == 0 {
            return Err(invalid(
                "general.checkpoint_interval_ms",
                "must be greater than 0",
            ));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must be greater than 0"));
            }
            if !self.metrics.endpoint.starts_with('/') {
                return Err(invalid("metrics.endpoint", "must start with '/'"));
            }
        }

        let mut seen = HashSet::new();
        for (i, source) in self.sources.iter().enumerate() {
            if !seen.insert(source.name.as_str()) {
                return Err(invalid(
                    &format!("sources[{i}].name"),
                    format!("duplicate source name '{}'", source.name),
                ));
            }
            source.validate(i)?;
        }

        Ok(())
    }

    /// Sources with `enabled = true`.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

/// Daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
    /// Data directory; checkpoints live under `<data_dir>/checkpoints`
    pub data_dir: String,
    /// PID file path (empty disables)
    pub pid_file: String,
    /// Minimum interval between checkpoint writes (milliseconds)
    pub checkpoint_interval_ms: u64,
    /// Interval of the periodic health log line (seconds, 0 disables)
    pub health_interval_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/logrelay".to_owned(),
            pid_file: String::new(),
            checkpoint_interval_ms: 1000,
            health_interval_secs: 60,
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose metrics
    pub enabled: bool,
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub port: u16,
    /// Scrape path
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9102,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// Webhook payload style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStyle {
    /// Plain `content` text
    #[default]
    Content,
    /// One embed with a per-kind colour
    Embed,
}

/// Outbound text templates.
///
/// Placeholders: `{server}`, `{name}`, `{message}`, `{ip}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub join: String,
    pub leave: String,
    pub chat: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            join: "[{server}] + {name} entered the game".to_owned(),
            leave: "[{server}] - {name} left the game".to_owned(),
            chat: "[{server}] {name}: {message}".to_owned(),
        }
    }
}

/// One followed log file and where its events go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Unique source name, used in logs, metrics and checkpoint file names
    pub name: String,
    /// Whether the daemon runs this source
    pub enabled: bool,
    /// Log file to follow
    pub log_path: String,
    /// Built-in grammar preset
    pub grammar: String,
    /// YAML grammar file; takes precedence over `grammar`
    pub grammar_file: Option<String>,
    /// Webhook endpoint (empty: events are classified and dropped)
    pub webhook_url: String,
    /// Prefix shown in messages; defaults to the source name
    pub server_name: String,
    /// Ignore list file
    pub ignore_file: Option<String>,
    /// Skip existing content on first open
    pub start_at_end: bool,
    /// Bytes of history replayed on first open (KiB)
    pub replay_tail_kb: u64,
    /// EOF poll interval (milliseconds)
    pub poll_interval_ms: u64,
    /// Retry delay after I/O errors (milliseconds)
    pub error_backoff_ms: u64,
    /// Longest line held before force-flushing (bytes)
    pub max_line_bytes: usize,
    pub post_joins: bool,
    pub post_leaves: bool,
    pub post_chat: bool,
    /// Send "relay online" once at startup
    pub startup_test_post: bool,
    /// Persist the read position across restarts
    pub checkpoint: bool,
    pub message_style: MessageStyle,
    /// Webhook username override
    pub username: Option<String>,
    /// Maximum outbound characters including the ellipsis
    pub max_message_chars: usize,
    pub request_timeout_secs: u64,
    /// Wait after a 429 without a usable retry hint (milliseconds)
    pub rate_limit_fallback_ms: u64,
    /// Cap on any rate-limit wait (seconds)
    pub max_retry_after_secs: u64,
    pub retry_on_rate_limit: bool,
    /// Replaces the grammar's system-token list
    pub system_tokens: Option<Vec<String>>,
    /// Replaces the grammar's digit/dot speaker rule
    pub reject_digits_and_dots: Option<bool>,
    pub templates: MessageTemplates,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            enabled: true,
            log_path: String::new(),
            grammar: "armagetron".to_owned(),
            grammar_file: None,
            webhook_url: String::new(),
            server_name: String::new(),
            ignore_file: None,
            start_at_end: false,
            replay_tail_kb: 64,
            poll_interval_ms: 200,
            error_backoff_ms: 500,
            max_line_bytes: 64 * 1024,
            post_joins: true,
            post_leaves: true,
            post_chat: true,
            startup_test_post: false,
            checkpoint: true,
            message_style: MessageStyle::Content,
            username: None,
            max_message_chars: 1900,
            request_timeout_secs: 10,
            rate_limit_fallback_ms: 2500,
            max_retry_after_secs: 60,
            retry_on_rate_limit: true,
            system_tokens: None,
            reject_digits_and_dots: None,
            templates: MessageTemplates::default(),
        }
    }
}

impl SourceConfig {
    /// Environment variable prefix for this source.
    pub fn env_prefix(&self) -> String {
        format!(
            "LOGRELAY_SOURCE_{}",
            self.name.to_uppercase().replace('-', "_")
        )
    }

    /// `server_name`, or the source name when unset.
    pub fn display_server(&self) -> &str {
        if self.server_name.is_empty() {
            &self.name
        } else {
            &self.server_name
        }
    }

    fn validate(&self, index: usize) -> Result<(), RelayError> {
        let field = |name: &str| format!("sources[{index}].{name}");

        if self.name.trim().is_empty() {
            return Err(invalid(&field("name"), "must not be empty"));
        }
        // the name becomes a checkpoint file name and an env var key
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(
                &field("name"),
                format!(
                    "'{}' may only contain ASCII letters, digits, '-' and '_'",
                    self.name
                ),
            ));
        }
        if self.log_path.trim().is_empty() {
            return Err(invalid(&field("log_path"), "must not be empty"));
        }
        if self.grammar_file.is_none() && !GRAMMAR_PRESETS.contains(&self.grammar.as_str()) {
            return Err(invalid(
                &field("grammar"),
                format!(
                    "unknown preset '{}', expected one of: {}",
                    self.grammar,
                    GRAMMAR_PRESETS.join(", ")
                ),
            ));
        }
        if !self.webhook_url.is_empty()
            && !(self.webhook_url.starts_with("https://") || self.webhook_url.starts_with("http://"))
        {
            return Err(invalid(&field("webhook_url"), "scheme must be http or https"));
        }

        check_range(&field("poll_interval_ms"), self.poll_interval_ms, 10, 60_000)?;
        check_range(&field("error_backoff_ms"), self.error_backoff_ms, 10, 300_000)?;
        check_range(&field("replay_tail_kb"), self.replay_tail_kb, 0, 65_536)?;
        check_range(
            &field("max_line_bytes"),
            self.max_line_bytes as u64,
            256,
            16 * 1024 * 1024,
        )?;
        check_range(
            &field("max_message_chars"),
            self.max_message_chars as u64,
            16,
            2000,
        )?;
        check_range(&field("request_timeout_secs"), self.request_timeout_secs, 1, 300)?;
        check_range(
            &field("rate_limit_fallback_ms"),
            self.rate_limit_fallback_ms,
            0,
            600_000,
        )?;
        check_range(&field("max_retry_after_secs"), self.max_retry_after_secs, 1, 3600)?;

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> RelayError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), RelayError> {
    if value < min || value > max {
        return Err(invalid(
            field,
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(())
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
