//! Webhook delivery.
//!
//! - [`format`]: event → outbound text (templates, server prefix, mentions)
//! - [`webhook`]: reqwest transport and the rate-limit aware [`WebhookSink`]
//!
//! The transport is a trait so the sink's 429 handling can be driven by
//! scripted responses in tests.

pub mod format;
pub mod webhook;

pub use format::MessageFormatter;
pub use webhook::{HttpTransport, WebhookSink};

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use logrelay_core::config::MessageStyle;
use logrelay_core::event::EventKind;

/// Status and rate-limit hint of one webhook POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Wait requested by the endpoint, only set on 429
    pub retry_after: Option<Duration>,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            status: 429,
            retry_after,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Sends one JSON payload to a webhook endpoint.
///
/// `Err` means no HTTP status was received (connect failure, timeout).
pub trait WebhookTransport: Send + Sync {
    fn post(
        &self,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<TransportResponse, String>> + Send;
}

/// Result of delivering one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint answered 2xx
    Delivered {
        /// POSTs issued, 2 when a rate-limit retry succeeded
        attempts: u32,
    },
    /// Still rate limited after the allowed wait; message dropped
    RateLimitedThenDropped {
        /// Last wait applied
        retry_after: Duration,
    },
    /// Non-2xx/429 status or transport error; message dropped
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::RateLimitedThenDropped { .. } => "rate_limited",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Sink settings for one source.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Source name, used as a metric label
    pub source: String,
    pub max_message_chars: usize,
    pub request_timeout: Duration,
    /// Wait used when a 429 carries no hint
    pub rate_limit_fallback: Duration,
    /// Upper bound for any rate-limit wait
    pub max_retry_after: Duration,
    pub retry_on_rate_limit: bool,
    pub style: MessageStyle,
    pub username: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            source: "default".to_owned(),
            max_message_chars: 1900,
            request_timeout: Duration::from_secs(10),
            rate_limit_fallback: Duration::from_millis(2500),
            max_retry_after: Duration::from_secs(60),
            retry_on_rate_limit: true,
            style: MessageStyle::Content,
            username: None,
        }
    }
}

/// A formatted message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    /// Event kind, `None` for relay status messages
    pub kind: Option<EventKind>,
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>, kind: Option<EventKind>) -> Self {
        Self {
            text: text.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_classification() {
        assert!(TransportResponse::new(204).is_success());
        assert!(TransportResponse::new(200).is_success());
        assert!(!TransportResponse::new(400).is_success());
        assert!(TransportResponse::rate_limited(None).is_rate_limited());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(DeliveryOutcome::Delivered { attempts: 1 }.as_str(), "delivered");
        assert_eq!(
            DeliveryOutcome::RateLimitedThenDropped {
                retry_after: Duration::from_secs(1)
            }
            .as_str(),
            "rate_limited"
        );
        assert_eq!(
            DeliveryOutcome::Failed {
                reason: "x".to_owned()
            }
            .as_str(),
            "failed"
        );
    }
}
