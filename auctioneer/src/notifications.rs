use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::dependencies::NotificationSink;

/// Posts notifications to a Slack incoming webhook.
pub struct SlackSink {
    client: reqwest::Client,
    webhook_url: String,
    bot_name: String,
}

impl SlackSink {
    pub fn new(webhook_url: String, bot_name: String) -> Self {
        SlackSink {
            client: reqwest::Client::new(),
            webhook_url,
            bot_name,
        }
    }
}

#[async_trait]
impl NotificationSink for SlackSink {
    async fn notify(&self, title: &str, pool: &str, body: &str) {
        let text = format!(
            "*{}*: {}\n*Pool Address*: {}\n{}",
            self.bot_name, title, pool, body
        );
        let result = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await;
        if let Err(error) = result {
            warn!(?error, "failed to deliver slack notification");
        }
    }
}

/// Posts notifications to a Discord webhook.
pub struct DiscordSink {
    client: reqwest::Client,
    webhook_url: String,
    bot_name: String,
}

impl DiscordSink {
    pub fn new(webhook_url: String, bot_name: String) -> Self {
        DiscordSink {
            client: reqwest::Client::new(),
            webhook_url,
            bot_name,
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn notify(&self, title: &str, pool: &str, body: &str) {
        let content = format!(
            "**{}**: {}\n**Pool Address**: {}\n{}",
            self.bot_name, title, pool, body
        );
        let result = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "content": content }))
            .send()
            .await;
        if let Err(error) = result {
            warn!(?error, "failed to deliver discord notification");
        }
    }
}

/// Fallback sink when no webhook is configured.
pub struct StdoutSink {
    bot_name: String,
}

impl StdoutSink {
    pub fn new(bot_name: String) -> Self {
        StdoutSink { bot_name }
    }
}

#[async_trait]
impl NotificationSink for StdoutSink {
    async fn notify(&self, title: &str, pool: &str, body: &str) {
        info!(bot = %self.bot_name, pool = %pool, "{}: {}", title, body);
    }
}
