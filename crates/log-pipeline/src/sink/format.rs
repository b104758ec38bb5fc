//! Event → outbound text.

use logrelay_core::config::MessageTemplates;
use logrelay_core::event::{Event, RelayEvent};

use super::OutboundMessage;
use crate::classifier::sanitize_mentions;

/// Renders events with a source's templates and server prefix.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    server: String,
    templates: MessageTemplates,
}

impl MessageFormatter {
    pub fn new(server: impl Into<String>, templates: MessageTemplates) -> Self {
        Self {
            server: server.into(),
            templates,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Formats a classified event. `None` for [`Event::Unmatched`].
    ///
    /// Player-supplied fields have their `@` mentions neutralized.
    pub fn format(&self, event: &RelayEvent) -> Option<OutboundMessage> {
        let (template, name, message, ip) = match &event.event {
            Event::Join { name, ip, .. } => (&self.templates.join, name, "", ip.as_deref()),
            Event::Leave { name, .. } => (&self.templates.leave, name, "", None),
            Event::Chat { name, message, .. } => {
                (&self.templates.chat, name, message.as_str(), None)
            }
            Event::Unmatched => return None,
        };

        let name = sanitize_mentions(name);
        let message = sanitize_mentions(message);
        let text = render(template, |key| match key {
            "server" => Some(self.server.as_str()),
            "name" => Some(name.as_str()),
            "message" => Some(message.as_str()),
            "ip" => Some(ip.unwrap_or("")),
            _ => None,
        });

        Some(OutboundMessage {
            text,
            kind: Some(event.event.kind()),
            timestamp: event.metadata.timestamp,
        })
    }

    /// Message posted once at startup to check the webhook.
    pub fn startup_message(&self) -> OutboundMessage {
        OutboundMessage::new(
            format!("[{}] relay online (startup test)", self.server),
            None,
        )
    }
}

/// Replaces `{key}` placeholders in one pass. Unknown placeholders are
/// left as written, and substituted values are never re-scanned.
pub fn render<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match lookup(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
