//! Discord webhook sink.
//!
//! Three channels: `logs` for traffic, `bans` for new bans, `errors` for
//! process faults. A channel without a URL is skipped silently.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{AuditError, AuditEvent, AuditSink};
use crate::config::WebhookUrls;

const GREY: u32 = 10_070_709;
const GREEN: u32 = 5_763_719;
const ORANGE: u32 = 15_105_570;
const RED: u32 = 15_548_997;

// Discord rejects embed field values above this.
const FIELD_VALUE_MAX: usize = 1024;

pub struct DiscordSink {
    client: reqwest::Client,
    webhooks: WebhookUrls,
}

impl DiscordSink {
    pub fn new(webhooks: WebhookUrls, timeout: Duration) -> Result<Self, AuditError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuditError::Transport(format!("client build failed: {e}")))?;
        Ok(Self { client, webhooks })
    }

    fn channel(&self, event: &AuditEvent) -> Option<&str> {
        let url = match event {
            AuditEvent::RouteAccess { .. }
            | AuditEvent::BlockedAccess { .. }
            | AuditEvent::ValidQuery { .. }
            | AuditEvent::InvalidQuery { .. } => &self.webhooks.logs,
            AuditEvent::NewBan { .. } => &self.webhooks.bans,
            AuditEvent::UnhandledFault { .. } => &self.webhooks.errors,
        };
        url.as_deref()
    }
}

#[async_trait]
impl AuditSink for DiscordSink {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn deliver(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let Some(url) = self.channel(event) else {
            return Ok(());
        };

        let resp = self
            .client
            .post(url)
            .json(&payload(event))
            .send()
            .await
            .map_err(|e| AuditError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuditError::Status(status.as_u16()));
        }
        Ok(())
    }
}

fn field(name: &str, value: &str) -> Value {
    let value = match value.char_indices().nth(FIELD_VALUE_MAX) {
        Some((cut, _)) => &value[..cut],
        None => value,
    };
    let value = if value.trim().is_empty() { "-" } else { value };
    json!({ "name": name, "value": value, "inline": false })
}

/// Webhook body for one event.
pub fn payload(event: &AuditEvent) -> Value {
    let (title, color, fields) = match event {
        AuditEvent::RouteAccess { identifier, route } => (
            Some("Route Access"),
            GREY,
            vec![field("Route", route), field("User IP", &identifier.to_string())],
        ),
        AuditEvent::BlockedAccess { identifier, route } => (
            Some("Blocked Access"),
            ORANGE,
            vec![field("Route", route), field("User IP", &identifier.to_string())],
        ),
        AuditEvent::ValidQuery { identifier, value } => (
            Some("Valid Query"),
            GREEN,
            vec![field("Value", value), field("User IP", &identifier.to_string())],
        ),
        AuditEvent::InvalidQuery { identifier, value, reason } => (
            Some("Invalid Query"),
            RED,
            vec![
                field("Value", value),
                field("User IP", &identifier.to_string()),
                field("Reason", reason),
            ],
        ),
        AuditEvent::NewBan { identifier, reason } => (
            Some("New IP Banned"),
            RED,
            vec![field("IP", &identifier.to_string()), field("Reason", reason)],
        ),
        AuditEvent::UnhandledFault { description } => {
            (None, RED, vec![field("Unhandled Error", description)])
        }
    };

    let mut embed = json!({
        "color": color,
        "type": "rich",
        "fields": fields,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let Some(t) = title {
        embed["title"] = json!(t);
    }

    json!({ "embeds": [embed] })
}
