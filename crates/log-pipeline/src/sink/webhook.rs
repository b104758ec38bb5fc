//! Discord-style webhook sink.
//!
//! One POST per message. A 429 is answered with a bounded wait and at most
//! one retry; anything else that is not 2xx drops the message. A message is
//! never posted again after a 2xx.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde_json::json;
use tokio::time::Instant;

use logrelay_core::config::MessageStyle;
use logrelay_core::event::EventKind;
use logrelay_core::metrics as m;

use super::{DeliveryOutcome, OutboundMessage, SinkConfig, TransportResponse, WebhookTransport};
use crate::error::LogRelayError;

/// Appended to truncated messages.
const ELLIPSIS: char = '…';

const COLOR_JOIN: u32 = 0x00FF00;
const COLOR_LEAVE: u32 = 0xFF0000;
const COLOR_CHAT: u32 = 0xFFFFFF;
const COLOR_STATUS: u32 = 0xCCCCCC;

/// Builds a client for [`HttpTransport`]. One client can be shared by all
/// sources to reuse its connection pool.
pub fn build_client(user_agent: &str) -> Result<Client, LogRelayError> {
    Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|e| LogRelayError::Sink(format!("failed to build http client: {e}")))
}

/// Default user agent.
pub fn default_user_agent() -> String {
    format!("logrelay/{}", env!("CARGO_PKG_VERSION"))
}

/// reqwest-backed transport for one webhook URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl WebhookTransport for HttpTransport {
    async fn post(&self, payload: &serde_json::Value) -> Result<TransportResponse, String> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status().as_u16();
        if status != 429 {
            return Ok(TransportResponse::new(status));
        }

        let header = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_seconds);
        let body = response.text().await.unwrap_or_default();
        Ok(TransportResponse::rate_limited(
            retry_after_from_body(&body).or(header),
        ))
    }
}

/// Parses a non-negative, possibly fractional seconds value.
pub fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    seconds_to_duration(secs)
}

/// Reads `retry_after` (seconds) from a 429 JSON body.
pub fn retry_after_from_body(body: &str) -> Option<Duration> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let secs = match &value["retry_after"] {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    seconds_to_duration(secs)
}

fn seconds_to_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs.min(u32::MAX as f64)))
    } else {
        None
    }
}

/// Truncates `text` to at most `max_chars` characters, the last being `…`.
pub fn truncate_message(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push(ELLIPSIS);
    out
}

fn embed_color(kind: Option<EventKind>) -> u32 {
    match kind {
        Some(EventKind::Join) => COLOR_JOIN,
        Some(EventKind::Leave) => COLOR_LEAVE,
        Some(EventKind::Chat) => COLOR_CHAT,
        Some(EventKind::Unmatched) | None => COLOR_STATUS,
    }
}

/// Delivers messages for one source.
pub struct WebhookSink<T: WebhookTransport = HttpTransport> {
    transport: T,
    config: SinkConfig,
}

impl<T: WebhookTransport> std::fmt::Debug for WebhookSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSink")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: WebhookTransport> WebhookSink<T> {
    pub fn new(transport: T, config: SinkConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Builds the JSON payload for `message`.
    pub fn build_payload(&self, message: &OutboundMessage) -> serde_json::Value {
        let text = truncate_message(&message.text, self.config.max_message_chars);
        let mut payload = match self.config.style {
            MessageStyle::Content => json!({
                "content": text,
                "allowed_mentions": { "parse": [] },
            }),
            MessageStyle::Embed => json!({
                "embeds": [{
                    "description": text,
                    "color": embed_color(message.kind),
                    "timestamp": message.timestamp.to_rfc3339(),
                }],
                "allowed_mentions": { "parse": [] },
            }),
        };
        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }
        payload
    }

    /// Delivers one message. Never posts it again after a 2xx.
    pub async fn deliver(&self, message: &OutboundMessage) -> DeliveryOutcome {
        let payload = self.build_payload(message);
        let started = Instant::now();
        let outcome = self.send(&payload).await;

        metrics::histogram!(m::DELIVERY_DURATION_SECONDS, m::LABEL_SOURCE => self.config.source.clone())
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(
            m::DELIVERIES_TOTAL,
            m::LABEL_SOURCE => self.config.source.clone(),
            m::LABEL_RESULT => outcome.as_str()
        )
        .increment(1);

        match &outcome {
            DeliveryOutcome::Delivered { attempts } => {
                tracing::debug!(source = %self.config.source, attempts, "webhook delivered");
            }
            DeliveryOutcome::RateLimitedThenDropped { retry_after } => {
                tracing::warn!(
                    source = %self.config.source,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "still rate limited, message dropped"
                );
            }
            DeliveryOutcome::Failed { reason } => {
                tracing::warn!(source = %self.config.source, reason = %reason, "webhook delivery failed, message dropped");
            }
        }
        outcome
    }

    async fn send(&self, payload: &serde_json::Value) -> DeliveryOutcome {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let response = match self.transport.post(payload).await {
                Ok(response) => response,
                Err(reason) => return DeliveryOutcome::Failed { reason },
            };

            if response.is_success() {
                return DeliveryOutcome::Delivered { attempts };
            }
            if !response.is_rate_limited() {
                return DeliveryOutcome::Failed {
                    reason: format!("HTTP {}", response.status),
                };
            }

            let wait = response
                .retry_after
                .unwrap_or(self.config.rate_limit_fallback)
                .min(self.config.max_retry_after);
            metrics::counter!(m::RATE_LIMIT_HITS_TOTAL, m::LABEL_SOURCE => self.config.source.clone())
                .increment(1);
            tracing::warn!(
                source = %self.config.source,
                attempt = attempts,
                wait_ms = wait.as_millis() as u64,
                hinted = response.retry_after.is_some(),
                "webhook rate limited (429), waiting"
            );
            tokio::time::sleep(wait).await;

            if attempts == 1 && self.config.retry_on_rate_limit {
                continue;
            }
            return DeliveryOutcome::RateLimitedThenDropped { retry_after: wait };
        }
    }
}
