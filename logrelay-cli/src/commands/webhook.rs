//! `logrelay webhook` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use logrelay_core::config::RelayConfig;
use logrelay_pipeline::sink::webhook::{build_client, default_user_agent};
use logrelay_pipeline::{
    DeliveryOutcome, HttpTransport, MessageFormatter, OutboundMessage, SourcePipelineConfig,
    WebhookSink, WebhookTransport,
};

use crate::cli::{WebhookAction, WebhookArgs};
use crate::commands::config::redact_webhook_url;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `webhook` command.
pub async fn execute(
    args: WebhookArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        WebhookAction::Test { source, message } => {
            let report = post_test_message(config_path, &source, message.as_deref()).await?;
            writer.render(&report)?;
            if !report.delivered {
                return Err(CliError::Delivery(format!(
                    "{}: {}",
                    report.outcome, report.detail
                )));
            }
            Ok(())
        }
    }
}

/// Loads the source's sink settings and posts one message over HTTP.
pub async fn post_test_message(
    config_path: &Path,
    source: &str,
    text: Option<&str>,
) -> Result<WebhookTestReport, CliError> {
    let config = RelayConfig::load(config_path).await?;
    let core = config
        .sources
        .iter()
        .find(|s| s.name == source)
        .ok_or_else(|| CliError::Command(format!("unknown source: {source}")))?;
    let runtime = SourcePipelineConfig::from_core(core, &config.general);

    let url = runtime
        .webhook_url
        .clone()
        .ok_or_else(|| CliError::Config(format!("source '{source}' has no webhook_url")))?;

    let client = build_client(&default_user_agent())?;
    let transport = HttpTransport::new(client, &url, runtime.sink.request_timeout);
    let sink = WebhookSink::new(transport, runtime.sink.clone());

    let formatter = MessageFormatter::new(&runtime.server_name, runtime.templates.clone());
    let message = match text {
        Some(text) => OutboundMessage::new(format!("[{}] {}", formatter.server(), text), None),
        None => formatter.startup_message(),
    };

    info!(source, url = %redact_webhook_url(&url), "posting test message");
    Ok(send(&sink, source, &redact_webhook_url(&url), &message).await)
}

/// Delivers `message` through `sink` and summarizes the outcome.
pub async fn send<T: WebhookTransport>(
    sink: &WebhookSink<T>,
    source: &str,
    url: &str,
    message: &OutboundMessage,
) -> WebhookTestReport {
    let outcome = sink.deliver(message).await;
    let detail = match &outcome {
        DeliveryOutcome::Delivered { attempts } => format!("accepted after {attempts} attempt(s)"),
        DeliveryOutcome::RateLimitedThenDropped { retry_after } => {
            format!("still rate limited after waiting {} ms", retry_after.as_millis())
        }
        DeliveryOutcome::Failed { reason } => reason.clone(),
    };

    WebhookTestReport {
        source: source.to_owned(),
        url: url.to_owned(),
        message: message.text.clone(),
        delivered: outcome.is_delivered(),
        outcome: outcome.as_str().to_owned(),
        detail,
    }
}

/// Result of a webhook test post.
#[derive(Debug, Serialize)]
pub struct WebhookTestReport {
    pub source: String,
    /// Webhook URL with the token redacted
    pub url: String,
    pub message: String,
    pub delivered: bool,
    pub outcome: String,
    pub detail: String,
}

impl Render for WebhookTestReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Webhook test: {} -> {}", self.source.bold(), self.url)?;
        writeln!(w, "  Message: {}", self.message)?;
        let outcome = if self.delivered {
            self.outcome.green().bold()
        } else {
            self.outcome.red().bold()
        };
        writeln!(w, "  Result: {} ({})", outcome, self.detail)
    }
}
