//! Webhook 渠道 - HTTP POST 到 Slack / Discord / 企业微信机器人或任意 JSON 接收端

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::render_text;
use crate::config::WebhookFormat;
use crate::notification::channel::{NotificationChannel, SendResult};
use crate::notification::message::Notification;

/// Webhook 渠道配置
#[derive(Debug, Clone)]
pub struct WebhookChannelConfig {
    pub url: String,
    pub format: WebhookFormat,
    pub headers: BTreeMap<String, String>,
    pub timeout_secs: u64,
}

/// Webhook 渠道
#[derive(Debug)]
pub struct WebhookChannel {
    name: String,
    config: WebhookChannelConfig,
    client: Client,
}

impl WebhookChannel {
    pub fn new(name: impl Into<String>, config: WebhookChannelConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(anyhow!("webhook url is required"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    /// 按格式构造请求体
    fn body(&self, notification: &Notification) -> Result<Value> {
        build_body(self.config.format, notification)
    }
}

fn build_body(format: WebhookFormat, notification: &Notification) -> Result<Value> {
    let text = render_text(notification);
    let body = match format {
        WebhookFormat::Slack => match &notification.extras.embed {
            // Slack blocks 原样转发
            Some(blocks) => json!({ "text": text, "blocks": blocks }),
            None => json!({ "text": text }),
        },
        WebhookFormat::Discord => match &notification.extras.embed {
            Some(embed) => json!({ "content": text, "embeds": [embed] }),
            None => json!({ "content": text }),
        },
        WebhookFormat::Wechat => json!({ "msgtype": "text", "text": { "content": text } }),
        WebhookFormat::Json => serde_json::to_value(notification)?,
    };
    Ok(body)
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<SendResult> {
        let mut request = self.client.post(&self.config.url);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request
            .json(&self.body(notification)?)
            .send()
            .await
            .map_err(|e| anyhow!("Webhook request failed: {}", e))?;

        let status = response.status();
        if status.is_success() {
            Ok(SendResult::Sent)
        } else {
            let detail = response.text().await.unwrap_or_default();
            Ok(SendResult::Failed(format!(
                "Webhook returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )))
        }
    }
}
