//! 具体渠道实现

pub mod local_file;
pub mod openclaw_message;
pub mod telegram;
pub mod webhook;

pub use local_file::LocalFileChannel;
pub use openclaw_message::{find_openclaw_path, OpenclawMessageChannel, OpenclawMessageConfig};
pub use telegram::{TelegramChannel, TelegramConfig};
pub use webhook::{WebhookChannel, WebhookChannelConfig};

use anyhow::Result;
use std::sync::Arc;

use super::channel::NotificationChannel;
use super::message::{Notification, NotificationKind};
use super::priority::Priority;
use crate::config::AdapterConfig;

/// 根据配置创建渠道 adapter
pub fn build_channel(name: &str, adapter: &AdapterConfig) -> Result<Arc<dyn NotificationChannel>> {
    let channel: Arc<dyn NotificationChannel> = match adapter {
        AdapterConfig::Webhook {
            url,
            format,
            headers,
            timeout_secs,
        } => Arc::new(WebhookChannel::new(
            name,
            WebhookChannelConfig {
                url: url.clone(),
                format: *format,
                headers: headers.clone(),
                timeout_secs: *timeout_secs,
            },
        )?),
        AdapterConfig::Telegram {
            bot_token,
            chat_id,
            api_base,
            timeout_secs,
        } => Arc::new(TelegramChannel::new(
            name,
            TelegramConfig {
                bot_token: bot_token.clone(),
                chat_id: chat_id.clone(),
                api_base: api_base.clone(),
                timeout_secs: *timeout_secs,
            },
        )?),
        AdapterConfig::Openclaw {
            channel_type,
            target,
            openclaw_cmd,
        } => Arc::new(OpenclawMessageChannel::new(
            name,
            OpenclawMessageConfig {
                channel_type: channel_type.clone(),
                target: target.clone(),
                openclaw_cmd: openclaw_cmd.clone().unwrap_or_else(find_openclaw_path),
            },
        )),
        AdapterConfig::LocalFile { path } => Arc::new(LocalFileChannel::new(name, path.clone())),
    };
    Ok(channel)
}

/// 纯文本渲染：`[ERROR][high] subject\ntext`
pub(crate) fn render_text(notification: &Notification) -> String {
    let mut prefix = String::new();
    match notification.kind {
        NotificationKind::Error => prefix.push_str("[ERROR]"),
        NotificationKind::Warning => prefix.push_str("[WARN]"),
        NotificationKind::Info => prefix.push_str("[INFO]"),
        NotificationKind::Plain => {}
    }
    if let Some(priority @ (Priority::Critical | Priority::High)) = notification.priority {
        prefix.push_str(&format!("[{}]", priority));
    }

    let body = match &notification.extras.subject {
        Some(subject) => format!("{}\n{}", subject, notification.text),
        None => notification.text.clone(),
    };

    if prefix.is_empty() {
        body
    } else {
        format!("{} {}", prefix, body)
    }
}
