//! Slack incoming-webhook notifier.
//!
//! The task's notification target is the webhook URL. Webhook URLs embed a
//! secret, so errors and logs only ever name the host.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{Message, Notifier};
use crate::error::NotificationError;

/// Username shown on posted messages.
const SLACK_USERNAME: &str = "steved";

/// Posts lifecycle messages to Slack incoming webhooks.
pub struct SlackWebhook {
    client: reqwest::Client,
}

impl SlackWebhook {
    /// Create a notifier whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build webhook client; using defaults");
                reqwest::Client::new()
            });
        Self { client }
    }

    /// Slack attachment payload for `message`.
    pub fn payload(message: &Message) -> serde_json::Value {
        let mut attachment = json!({
            "title": message.title,
            "color": message.severity.color(),
        });
        if let Some(body) = &message.body {
            attachment["text"] = json!(body);
        }
        json!({
            "username": SLACK_USERNAME,
            "attachments": [attachment],
        })
    }
}

/// Host part of a webhook URL, safe to log.
fn endpoint_label(target: &str) -> String {
    reqwest::Url::parse(target)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "<invalid webhook url>".to_string())
}

#[async_trait]
impl Notifier for SlackWebhook {
    async fn deliver(&self, target: &str, message: &Message) -> Result<(), NotificationError> {
        let resp = self
            .client
            .post(target)
            .json(&Self::payload(message))
            .send()
            .await
            .map_err(|e| NotificationError::RequestFailed {
                endpoint: endpoint_label(target),
                // reqwest errors include the URL.
                reason: e.without_url().to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(NotificationError::Rejected {
                endpoint: endpoint_label(target),
                status: resp.status().as_u16(),
            });
        }

        tracing::debug!(endpoint = %endpoint_label(target), title = %message.title, "Slack message posted");
        Ok(())
    }
}
