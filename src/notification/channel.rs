//! 通知渠道 trait 定义

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;

use super::message::{Notification, NotificationKind};

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（dry-run 或渠道自身过滤），视为成功
    Skipped(String),
    /// 发送失败
    Failed(String),
}

impl SendResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, SendResult::Failed(_))
    }
}

/// 渠道自检结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelTestReport {
    pub success: bool,
    pub message: String,
}

impl ChannelTestReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 通知渠道 trait
///
/// 超时由 adapter 自己负责；路由器只调用 `send` / `test`，
/// 返回 `Err` 或 `SendResult::Failed` 都记为该渠道失败。
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（与配置中的 key 一致）
    fn name(&self) -> &str;

    /// 渠道类型（webhook / telegram / openclaw / local_file ...）
    fn channel_type(&self) -> &str;

    /// adapter 是否可用（例如缺少凭据时为 false）
    fn is_enabled(&self) -> bool {
        true
    }

    /// 发送消息
    async fn send(&self, notification: &Notification) -> Result<SendResult>;

    /// 发送一条测试消息
    async fn test(&self) -> ChannelTestReport {
        let sample = Notification::new(
            format!("notify-hub test message for channel {}", self.name()),
            Local::now(),
        )
        .with_kind(NotificationKind::Info);

        match self.send(&sample).await {
            Ok(SendResult::Sent) => ChannelTestReport::ok("Test message sent"),
            Ok(SendResult::Skipped(reason)) => ChannelTestReport::ok(format!("Skipped: {}", reason)),
            Ok(SendResult::Failed(reason)) => ChannelTestReport::failed(reason),
            Err(e) => ChannelTestReport::failed(e.to_string()),
        }
    }
}
