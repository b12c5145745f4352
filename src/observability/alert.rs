//! Outbound alert webhook.
//!
//! Posts `{"text": ...}` to a chat-style webhook. Delivery is best effort:
//! failures are logged and never propagated to the caller.

use serde::Serialize;
use std::time::Duration;

const ALERT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct AlertPayload<'a> {
    text: &'a str,
}

#[derive(Clone)]
pub struct AlertSink {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl AlertSink {
    /// An empty URL produces a sink that drops every alert.
    pub fn new(webhook_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(ALERT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default alert client");
                reqwest::Client::new()
            });
        Self {
            webhook_url: Some(webhook_url.trim().to_string()).filter(|url| !url.is_empty()),
            client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub async fn send(&self, message: &str) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let text = format!("**Chaos Proxy Alert**\n{}", message);
        match self.client.post(url).json(&AlertPayload { text: &text }).send().await {
            Ok(response) if response.status().is_client_error() || response.status().is_server_error() => {
                tracing::warn!(status = response.status().as_u16(), "Alert webhook rejected alert");
            }
            Ok(_) => tracing::debug!("Alert delivered"),
            Err(e) => tracing::warn!(error = %e, "Alert delivery failed"),
        }
    }
}
