//! `logrelay config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use logrelay_core::config::{RelayConfig, SourceConfig};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const REDACTED: &str = "***REDACTED***";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => {
            let report = validate(config_path).await;
            writer.render(&report)?;
            if !report.valid {
                return Err(CliError::Config("configuration is invalid".to_owned()));
            }
            Ok(())
        }
        ConfigAction::Show { section, source } => {
            let report = show(config_path, section.as_deref(), source.as_deref()).await?;
            writer.render(&report)
        }
    }
}

/// Loads and validates the file, collecting the error instead of failing.
pub async fn validate(config_path: &Path) -> ConfigValidationReport {
    info!(path = %config_path.display(), "validating configuration");

    let (valid, errors, sources) = match RelayConfig::load(config_path).await {
        Ok(config) => {
            let sources = config
                .sources
                .iter()
                .map(|s| SourceSummary {
                    name: s.name.clone(),
                    enabled: s.enabled,
                    log_path: s.log_path.clone(),
                    grammar: match &s.grammar_file {
                        Some(file) => format!("file:{file}"),
                        None => format!("preset:{}", s.grammar),
                    },
                    webhook: !s.webhook_url.trim().is_empty(),
                })
                .collect();
            (true, Vec::new(), sources)
        }
        Err(e) => (false, vec![e.to_string()], Vec::new()),
    };

    ConfigValidationReport {
        source: config_path.display().to_string(),
        valid,
        errors,
        sources,
    }
}

/// Effective configuration with webhook tokens redacted.
///
/// `section` is one of `general`, `metrics`, `sources`; `source` selects a
/// single `[[sources]]` entry by name.
pub async fn show(
    config_path: &Path,
    section: Option<&str>,
    source: Option<&str>,
) -> Result<ConfigReport, CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let mut config = RelayConfig::load(config_path).await?;
    for s in &mut config.sources {
        s.webhook_url = redact_webhook_url(&s.webhook_url);
    }

    let (label, config_toml) = match (section, source) {
        (_, Some(name)) => {
            let found = config
                .sources
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| CliError::Command(format!("unknown source: {name}")))?;
            (Some(format!("sources.{name}")), to_toml(found))
        }
        (Some("general"), None) => (Some("general".to_owned()), to_toml(&config.general)),
        (Some("metrics"), None) => (Some("metrics".to_owned()), to_toml(&config.metrics)),
        (Some("sources"), None) => {
            #[derive(Serialize)]
            struct Sources<'a> {
                sources: &'a [SourceConfig],
            }
            (
                Some("sources".to_owned()),
                to_toml(&Sources {
                    sources: &config.sources,
                }),
            )
        }
        (Some(other), None) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, metrics, sources)"
            )));
        }
        (None, None) => (None, to_toml(&config)),
    };

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section: label,
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

/// Hides the token part of a webhook URL.
///
/// The last path segment is the secret in Discord-style URLs
/// (`/api/webhooks/<id>/<token>`); userinfo before `@` is hidden too.
pub fn redact_webhook_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_owned();
    };
    let scheme = &url[..scheme_end + 3];
    let rest = &url[scheme_end + 3..];

    let (authority, path) = match rest.find('/') {
        Some(slash) => rest.split_at(slash),
        None => (rest, ""),
    };
    let authority = match authority.rfind('@') {
        Some(at) => format!("{REDACTED}{}", &authority[at..]),
        None => authority.to_owned(),
    };

    let path = match path.rfind('/') {
        Some(last) if last + 1 < path.len() => format!("{}{REDACTED}", &path[..=last]),
        _ => path.to_owned(),
    };

    format!("{scheme}{authority}{path}")
}

/// Configuration display report.
///
/// `config_toml` is only used for text rendering.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{section}]").bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

/// One line of the validation summary.
#[derive(Debug, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub enabled: bool,
    pub log_path: String,
    pub grammar: String,
    pub webhook: bool,
}

/// Configuration validation report.
#[derive(Debug, Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub sources: Vec<SourceSummary>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if !self.valid {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
            return Ok(());
        }

        writeln!(w, "  Result: {}", "VALID".green().bold())?;
        for s in &self.sources {
            let state = if s.enabled {
                "enabled".green()
            } else {
                "disabled".yellow()
            };
            let sink = if s.webhook { "webhook" } else { "classify only" };
            writeln!(
                w,
                "  {:<16} {:<9} {:<24} {:<14} {}",
                s.name, state, s.grammar, sink, s.log_path
            )?;
        }
        Ok(())
    }
}
