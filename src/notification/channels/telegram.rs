//! Telegram 渠道 - 直接调用 Bot API `sendMessage`

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::render_text;
use crate::notification::channel::{NotificationChannel, SendResult};
use crate::notification::message::Notification;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram 渠道配置
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// 默认 https://api.telegram.org
    pub api_base: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram 渠道
#[derive(Debug)]
pub struct TelegramChannel {
    name: String,
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    pub fn new(name: impl Into<String>, config: TelegramConfig) -> Result<Self> {
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

    fn endpoint(&self) -> String {
        let base = self
            .config
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/');
        format!("{}/bot{}/sendMessage", base, self.config.bot_token)
    }

    fn request<'a>(&'a self, notification: &Notification) -> SendMessageRequest<'a> {
        // 提供了 html 时按 HTML 模式发送
        match &notification.extras.html {
            Some(html) => SendMessageRequest {
                chat_id: &self.config.chat_id,
                text: html.clone(),
                parse_mode: Some("HTML"),
            },
            None => SendMessageRequest {
                chat_id: &self.config.chat_id,
                text: render_text(notification),
                parse_mode: None,
            },
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "telegram"
    }

    fn is_enabled(&self) -> bool {
        !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    async fn send(&self, notification: &Notification) -> Result<SendResult> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&self.request(notification))
            .send()
            .await
            .map_err(|e| anyhow!("Telegram request failed: {}", e))?;

        let body: BotApiResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse Telegram response: {}", e))?;

        if body.ok {
            Ok(SendResult::Sent)
        } else {
            Ok(SendResult::Failed(
                body.description.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}
