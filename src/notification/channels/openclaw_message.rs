//! OpenClaw message send 通用渠道
//!
//! 支持所有 OpenClaw 支持的渠道：telegram, whatsapp, discord, slack, signal 等

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::error;

use super::render_text;
use crate::notification::channel::{NotificationChannel, SendResult};
use crate::notification::message::Notification;

/// OpenClaw message send 渠道配置
#[derive(Debug, Clone)]
pub struct OpenclawMessageConfig {
    /// 渠道类型: telegram, whatsapp, discord, slack, signal 等
    pub channel_type: String,
    /// 目标（chat_id, phone number, channel id 等）
    pub target: String,
    /// OpenClaw 命令路径
    pub openclaw_cmd: String,
}

/// OpenClaw message send 通用渠道
pub struct OpenclawMessageChannel {
    name: String,
    config: OpenclawMessageConfig,
}

impl OpenclawMessageChannel {
    pub fn new(name: impl Into<String>, config: OpenclawMessageConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// `openclaw message send` 的参数
    fn args(&self, notification: &Notification) -> Vec<String> {
        vec![
            "message".to_string(),
            "send".to_string(),
            "--channel".to_string(),
            self.config.channel_type.clone(),
            "--target".to_string(),
            self.config.target.clone(),
            "--message".to_string(),
            render_text(notification),
        ]
    }
}

/// 查找 openclaw 可执行文件路径
pub fn find_openclaw_path() -> String {
    // 优先使用 PATH 中的 openclaw
    if let Ok(path) = which::which("openclaw") {
        return path.to_string_lossy().to_string();
    }

    // 服务环境可能没有完整 PATH，检查常见位置
    if let Some(home) = dirs::home_dir() {
        for candidate in [".volta/bin/openclaw", ".local/bin/openclaw"] {
            let path = home.join(candidate);
            if path.exists() {
                return path.to_string_lossy().to_string();
            }
        }
    }

    for path in ["/usr/local/bin/openclaw", "/opt/homebrew/bin/openclaw"] {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    // 回退到默认
    "openclaw".to_string()
}

#[async_trait]
impl NotificationChannel for OpenclawMessageChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "openclaw"
    }

    fn is_enabled(&self) -> bool {
        !self.config.target.is_empty()
    }

    async fn send(&self, notification: &Notification) -> Result<SendResult> {
        let output = Command::new(&self.config.openclaw_cmd)
            .args(self.args(notification))
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.config.openclaw_cmd))?;

        if output.status.success() {
            Ok(SendResult::Sent)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                channel = %self.name,
                via = %self.config.channel_type,
                error = %stderr,
                "Failed to send message"
            );
            Ok(SendResult::Failed(stderr.trim().to_string()))
        }
    }
}
