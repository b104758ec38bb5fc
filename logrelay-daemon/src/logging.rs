//! Logging initialization for logrelay-daemon.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `RelayConfig`. `RUST_LOG` wins over `log_level` when set.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use logrelay_core::config::GeneralConfig;

/// Crates whose request-level chatter is capped at `warn` unless
/// `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Filter for `log_level`, with the HTTP stack held at `warn`.
///
/// Each source posts to its webhook on every event, so debug logs of the
/// HTTP client would drown the relay's own lines.
pub fn build_filter(log_level: &str) -> Result<EnvFilter> {
    let mut directives = log_level.to_owned();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    EnvFilter::try_new(&directives)
        .map_err(|e| anyhow::anyhow!("invalid log level '{}': {}", log_level, e))
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - one flattened JSON object per line (default)
/// * `"pretty"` - multi-line human-readable output
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.log_level)?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let initialized = match config.log_format.as_str() {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false),
            )
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    };

    initialized.map_err(|e| {
        anyhow::anyhow!(
            "failed to initialize {} tracing subscriber: {}",
            config.log_format,
            e
        )
    })
}

/// Applies `--log-level` / `--log-format` on top of the loaded config.
pub fn apply_cli_overrides(
    config: &mut GeneralConfig,
    log_level: Option<&str>,
    log_format: Option<&str>,
) {
    if let Some(level) = log_level {
        config.log_level = level.to_owned();
    }
    if let Some(format) = log_format {
        config.log_format = format.to_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_is_rejected() {
        let config = GeneralConfig {
            log_format: "xml".to_owned(),
            ..GeneralConfig::default()
        };
        let err = init_tracing(&config).unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn filter_quiets_http_stack() {
        let filter = build_filter("debug").unwrap().to_string();
        assert!(filter.contains("debug"));
        assert!(filter.contains("reqwest=warn"));
        assert!(filter.contains("hyper=warn"));
    }

    #[test]
    fn filter_rejects_garbage_level() {
        assert!(build_filter("tron=extreme").is_err());
    }

    #[test]
    fn cli_overrides_replace_config_values() {
        let mut config = GeneralConfig::default();
        apply_cli_overrides(&mut config, Some("debug"), None);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, "json");

        apply_cli_overrides(&mut config, None, Some("pretty"));
        assert_eq!(config.log_format, "pretty");
    }
}
