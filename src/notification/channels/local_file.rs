//! 本地文件渠道 - 将所有通知写入 JSONL 文件

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::RouterConfig;
use crate::notification::channel::{NotificationChannel, SendResult};
use crate::notification::message::{Notification, NotificationKind};
use crate::notification::priority::Priority;
use crate::notification::store::JsonlStore;

/// 最大记录数
const MAX_RECORDS: usize = 1000;

/// 本地通知记录（JSONL 格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLogRecord {
    pub ts: DateTime<Utc>,
    pub notification_id: u64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated: Option<usize>,
    pub summary: String,
}

impl DeliveryLogRecord {
    fn from_notification(notification: &Notification) -> Self {
        Self {
            ts: Utc::now(),
            notification_id: notification.id,
            kind: notification.kind,
            priority: notification.priority,
            module: notification.module.clone(),
            aggregated: notification.aggregation.map(|a| a.count),
            summary: notification.preview(100),
        }
    }
}

/// 本地文件渠道 - 记录所有通知到本地文件
pub struct LocalFileChannel {
    name: String,
    store: JsonlStore,
}

impl LocalFileChannel {
    /// 默认写入 `~/.config/notify-hub/notifications.jsonl`
    pub fn new(name: impl Into<String>, path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(|| RouterConfig::config_dir().join("notifications.jsonl"));
        Self {
            name: name.into(),
            store: JsonlStore::new(path, MAX_RECORDS),
        }
    }

    /// 读取最近 N 条记录
    pub fn read_recent(&self, n: usize) -> Vec<DeliveryLogRecord> {
        self.store.read_recent(n)
    }
}

#[async_trait]
impl NotificationChannel for LocalFileChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "local_file"
    }

    async fn send(&self, notification: &Notification) -> Result<SendResult> {
        // 本地文件写入很快，直接同步执行
        let record = DeliveryLogRecord::from_notification(notification);

        match self.store.append(&record) {
            Ok(()) => {
                debug!(
                    channel = %self.name,
                    notification_id = notification.id,
                    "Notification recorded to local file"
                );
                Ok(SendResult::Sent)
            }
            Err(e) => {
                warn!(
                    channel = %self.name,
                    error = %e,
                    "Failed to write notification to local file"
                );
                Ok(SendResult::Failed(e.to_string()))
            }
        }
    }
}
