//! 通知消息模型
//!
//! `NotifyOptions` 是生产者传入的松散选项（与 JSON 配置/CLI 参数一一对应）；
//! `Notification` 是路由的基本单位，创建后不可变。

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::priority::{NotificationType, Priority};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// 生产者传入的通知选项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyOptions {
    /// 通知类型: error / warning / info
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationType>,
    /// 优先级
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// 关键词
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// 来源模块
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// 显式指定的渠道（覆盖路由规则）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    /// 以下字段原样转发给 adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// 通知类型，各类型共享 text/priority/module 等基础字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Error,
    Warning,
    Info,
    /// 未声明类型
    #[default]
    Plain,
}

impl NotificationKind {
    /// 声明的类型（Plain 没有类型，不会匹配任何带 type 条件的规则）
    pub fn declared_type(&self) -> Option<NotificationType> {
        match self {
            NotificationKind::Error => Some(NotificationType::Error),
            NotificationKind::Warning => Some(NotificationType::Warning),
            NotificationKind::Info => Some(NotificationType::Info),
            NotificationKind::Plain => None,
        }
    }
}

impl From<Option<NotificationType>> for NotificationKind {
    fn from(kind: Option<NotificationType>) -> Self {
        match kind {
            Some(NotificationType::Error) => NotificationKind::Error,
            Some(NotificationType::Warning) => NotificationKind::Warning,
            Some(NotificationType::Info) => NotificationKind::Info,
            None => NotificationKind::Plain,
        }
    }
}

/// 转发给 adapter 的不透明字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// 聚合摘要信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationInfo {
    /// 被合并的通知数量（包含代表消息本身）
    pub count: usize,
}

/// 通知
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub text: String,
    #[serde(default, rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// 已小写、去重
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_channels: Option<Vec<String>>,
    #[serde(default)]
    pub extras: MessageExtras,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationInfo>,
    pub timestamp: DateTime<Local>,
}

impl Notification {
    /// 创建简单通知
    pub fn new(text: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            text: text.into(),
            kind: NotificationKind::Plain,
            priority: None,
            module: None,
            keywords: Vec::new(),
            requested_channels: None,
            extras: MessageExtras::default(),
            aggregation: None,
            timestamp,
        }
    }

    /// 从生产者选项创建
    pub fn from_options(
        text: impl Into<String>,
        options: NotifyOptions,
        timestamp: DateTime<Local>,
    ) -> Self {
        let mut notification = Self::new(text, timestamp).with_keywords(options.keywords);
        notification.kind = options.kind.into();
        notification.priority = options.priority;
        notification.module = options.module.filter(|m| !m.trim().is_empty());
        notification.requested_channels = options.channels;
        notification.extras = MessageExtras {
            embed: options.embed,
            html: options.html,
            subject: options.subject,
        };
        notification
    }

    pub fn with_kind(mut self, kind: NotificationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// 设置关键词（小写、去空白、去重，保持原顺序）
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let k = keyword.as_ref().trim().to_lowercase();
            if !k.is_empty() && !normalized.contains(&k) {
                normalized.push(k);
            }
        }
        self.keywords = normalized;
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_channels = Some(channels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_aggregation(mut self, count: usize) -> Self {
        self.aggregation = Some(AggregationInfo { count });
        self
    }

    /// 声明的类型
    pub fn notification_type(&self) -> Option<NotificationType> {
        self.kind.declared_type()
    }

    /// 是否是聚合摘要
    pub fn is_aggregated(&self) -> bool {
        self.aggregation.is_some()
    }

    /// 用于日志的简短预览
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            self.text.clone()
        } else {
            let truncated: String = self.text.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", truncated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_options() {
        let options = NotifyOptions {
            kind: Some(NotificationType::Error),
            priority: Some(Priority::High),
            keywords: vec!["Build".to_string(), " build ".to_string(), "CI".to_string()],
            module: Some("anomaly".to_string()),
            channels: None,
            subject: Some("Build failed".to_string()),
            ..Default::default()
        };
        let n = Notification::from_options("build failed on main", options, Local::now());

        assert_eq!(n.kind, NotificationKind::Error);
        assert_eq!(n.notification_type(), Some(NotificationType::Error));
        assert_eq!(n.priority, Some(Priority::High));
        assert_eq!(n.keywords, vec!["build", "ci"]);
        assert_eq!(n.module.as_deref(), Some("anomaly"));
        assert_eq!(n.extras.subject.as_deref(), Some("Build failed"));
        assert!(!n.is_aggregated());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Notification::new("a", Local::now());
        let b = Notification::new("b", Local::now());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let json = r#"{"type":"warning","priority":"low","channels":["slack"],"keywords":["disk"]}"#;
        let options: NotifyOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.kind, Some(NotificationType::Warning));
        assert_eq!(options.priority, Some(Priority::Low));
        assert_eq!(options.channels, Some(vec!["slack".to_string()]));
        assert_eq!(options.keywords, vec!["disk"]);
    }

    #[test]
    fn test_notification_serializes_kind_as_type() {
        let n = Notification::new("disk full", Local::now())
            .with_kind(NotificationKind::Warning)
            .with_aggregation(3);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["aggregation"]["count"], 3);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let n = Notification::new("磁盘空间不足，请尽快清理", Local::now());
        assert_eq!(n.preview(6), "磁盘空...");
        assert_eq!(n.preview(100), n.text);
    }
}
