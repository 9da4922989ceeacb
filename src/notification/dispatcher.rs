//! 通知分发器 - 并发发送到多个渠道并收集每个渠道的结果

use futures::future::join_all;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::channel::{ChannelTestReport, NotificationChannel, SendResult};
use super::message::Notification;
use crate::error::DeliveryError;

/// 单个渠道的投递结果
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub channel: String,
    pub result: Result<SendResult, DeliveryError>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(r) if r.is_success())
    }

    pub fn error(&self) -> Option<&DeliveryError> {
        self.result.as_ref().err()
    }
}

impl Serialize for DeliveryOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let skipped = match &self.result {
            Ok(SendResult::Skipped(reason)) => Some(reason.as_str()),
            _ => None,
        };

        let mut state = serializer.serialize_struct("DeliveryOutcome", 4)?;
        state.serialize_field("channel", &self.channel)?;
        state.serialize_field("success", &self.is_success())?;
        state.serialize_field("skipped", &skipped)?;
        state.serialize_field("error", &self.error())?;
        state.end()
    }
}

/// 一条通知的投递汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryResult {
    pub successful: usize,
    pub failed: usize,
    /// 实际尝试发送的渠道数
    pub total: usize,
    pub outcomes: Vec<DeliveryOutcome>,
    /// 被限流、进入队列的渠道
    pub queued: Vec<String>,
    /// 整条通知级别的错误（例如没有选中任何渠道）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DeliveryError>,
    /// 投递历史中的记录 id（用于之后附加反馈）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_id: Option<u64>,
}

impl DeliveryResult {
    pub fn from_outcomes(outcomes: Vec<DeliveryOutcome>, queued: Vec<String>) -> Self {
        let successful = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            successful,
            failed: outcomes.len() - successful,
            total: outcomes.len(),
            outcomes,
            queued,
            error: None,
            history_id: None,
        }
    }

    /// 没有任何渠道可用
    pub fn no_channels() -> Self {
        Self {
            failed: 1,
            error: Some(DeliveryError::NoChannelsSelected),
            ..Default::default()
        }
    }

    pub fn is_partial(&self) -> bool {
        self.successful > 0 && self.failed > 0
    }
}

/// 通知分发器 - 管理渠道 adapter 并并发发送
pub struct NotificationDispatcher {
    /// 按名称排序，便于输出稳定
    channels: BTreeMap<String, Arc<dyn NotificationChannel>>,
    /// 是否为 dry-run 模式
    dry_run: bool,
}

impl NotificationDispatcher {
    /// 创建新的分发器
    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// 注册渠道（同名替换）
    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(
            channel = channel.name(),
            channel_type = channel.channel_type(),
            "Registering notification channel"
        );
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn NotificationChannel>> {
        self.channels.get(name)
    }

    /// 获取已注册的渠道数量
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 获取已注册的渠道名称
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    /// 并发发送到所有给定渠道
    ///
    /// 等待全部完成；一个渠道失败不会影响其他渠道。结果顺序与 `channels` 一致。
    pub async fn dispatch(&self, notification: &Notification, channels: &[String]) -> Vec<DeliveryOutcome> {
        let sends = channels.iter().map(|name| async move {
            let result = match self.channels.get(name) {
                Some(channel) => self.send_one(channel.as_ref(), notification).await,
                None => {
                    warn!(channel = %name, "No adapter registered for channel");
                    Err(DeliveryError::ChannelNotFound {
                        channel: name.clone(),
                    })
                }
            };
            DeliveryOutcome {
                channel: name.clone(),
                result,
            }
        });

        join_all(sends).await
    }

    async fn send_one(
        &self,
        channel: &dyn NotificationChannel,
        notification: &Notification,
    ) -> Result<SendResult, DeliveryError> {
        let name = channel.name();

        if self.dry_run {
            info!(
                channel = %name,
                notification_id = notification.id,
                text = %notification.preview(60),
                "[DRY-RUN] Would send notification"
            );
            return Ok(SendResult::Skipped("dry-run".to_string()));
        }

        match channel.send(notification).await {
            Ok(SendResult::Failed(message)) => {
                warn!(channel = %name, error = %message, "Channel send failed");
                Err(DeliveryError::AdapterSendFailed {
                    channel: name.to_string(),
                    message,
                })
            }
            Ok(result) => {
                info!(channel = %name, notification_id = notification.id, "Notification sent");
                Ok(result)
            }
            Err(e) => {
                warn!(channel = %name, error = %e, "Channel send failed");
                Err(DeliveryError::AdapterSendFailed {
                    channel: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// 对渠道做自检；`only` 指定时只测试该渠道
    pub async fn test_channels(&self, only: Option<&str>) -> Vec<(String, ChannelTestReport)> {
        let targets: Vec<(&String, &Arc<dyn NotificationChannel>)> = self
            .channels
            .iter()
            .filter(|(name, _)| only.map_or(true, |o| o == name.as_str()))
            .collect();

        let tests = targets.into_iter().map(|(name, channel)| async move {
            let report = if self.dry_run {
                ChannelTestReport::ok("dry-run")
            } else {
                channel.test().await
            };
            (name.clone(), report)
        });

        join_all(tests).await
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Local;
    use std::sync::Mutex;

    /// 测试用的 mock 渠道，记录收到的文本
    struct MockChannel {
        name: String,
        sent: Mutex<Vec<String>>,
    }

    impl MockChannel {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationChannel for MockChannel {
        fn name(&self) -> &str {
            &self.name
        }

        fn channel_type(&self) -> &str {
            "mock"
        }

        async fn send(&self, notification: &Notification) -> Result<SendResult> {
            self.sent.lock().unwrap().push(notification.text.clone());
            Ok(SendResult::Sent)
        }
    }

    /// 总是失败的渠道
    struct FailingChannel {
        name: String,
        soft: bool,
    }

    #[async_trait]
    impl NotificationChannel for FailingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        fn channel_type(&self) -> &str {
            "mock"
        }

        async fn send(&self, _notification: &Notification) -> Result<SendResult> {
            if self.soft {
                Ok(SendResult::Failed("HTTP 502".to_string()))
            } else {
                Err(anyhow!("connection reset"))
            }
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dispatcher_register_channel() {
        let mut dispatcher = NotificationDispatcher::new();
        assert_eq!(dispatcher.channel_count(), 0);

        dispatcher.register_channel(Arc::new(MockChannel::new("test")));
        dispatcher.register_channel(Arc::new(MockChannel::new("test")));
        assert_eq!(dispatcher.channel_count(), 1);
        assert_eq!(dispatcher.channel_names(), vec!["test"]);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let mut dispatcher = NotificationDispatcher::new();
        let ok = Arc::new(MockChannel::new("b"));
        dispatcher.register_channel(Arc::new(FailingChannel {
            name: "a".to_string(),
            soft: false,
        }));
        dispatcher.register_channel(ok.clone());

        let n = Notification::new("deploy finished", Local::now());
        let outcomes = dispatcher.dispatch(&n, &names(&["a", "b"])).await;
        let result = DeliveryResult::from_outcomes(outcomes, Vec::new());

        assert_eq!((result.successful, result.failed, result.total), (1, 1, 2));
        assert!(result.is_partial());
        assert_eq!(result.outcomes[0].channel, "a");
        assert!(matches!(
            result.outcomes[0].error(),
            Some(DeliveryError::AdapterSendFailed { message, .. }) if message == "connection reset"
        ));
        assert_eq!(ok.sent(), vec!["deploy finished"]);
    }

    #[tokio::test]
    async fn test_soft_failure_and_missing_adapter() {
        let mut dispatcher = NotificationDispatcher::new();
        dispatcher.register_channel(Arc::new(FailingChannel {
            name: "slack".to_string(),
            soft: true,
        }));

        let n = Notification::new("x", Local::now());
        let outcomes = dispatcher.dispatch(&n, &names(&["slack", "ghost"])).await;

        assert!(matches!(
            outcomes[0].error(),
            Some(DeliveryError::AdapterSendFailed { message, .. }) if message == "HTTP 502"
        ));
        assert_eq!(
            outcomes[1].error(),
            Some(&DeliveryError::ChannelNotFound {
                channel: "ghost".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_dispatcher_dry_run() {
        let mut dispatcher = NotificationDispatcher::new().with_dry_run(true);
        let channel = Arc::new(MockChannel::new("test"));
        dispatcher.register_channel(channel.clone());

        let n = Notification::new("test", Local::now());
        let outcomes = dispatcher.dispatch(&n, &names(&["test"])).await;

        assert_eq!(outcomes[0].result, Ok(SendResult::Skipped("dry-run".to_string())));
        assert!(outcomes[0].is_success());
        assert!(channel.sent().is_empty()); // 不应该实际发送
    }

    #[test]
    fn test_no_channels_result() {
        let result = DeliveryResult::no_channels();
        assert_eq!((result.successful, result.failed, result.total), (0, 1, 0));
        assert_eq!(result.error, Some(DeliveryError::NoChannelsSelected));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = DeliveryOutcome {
            channel: "slack".to_string(),
            result: Err(DeliveryError::AdapterSendFailed {
                channel: "slack".to_string(),
                message: "boom".to_string(),
            }),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["channel"], "slack");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "adapter_send_failed");
    }

    #[tokio::test]
    async fn test_test_channels_filter() {
        let mut dispatcher = NotificationDispatcher::new();
        dispatcher.register_channel(Arc::new(MockChannel::new("a")));
        dispatcher.register_channel(Arc::new(FailingChannel {
            name: "b".to_string(),
            soft: false,
        }));

        let all = dispatcher.test_channels(None).await;
        assert_eq!(all.len(), 2);
        assert!(all[0].1.success);
        assert!(!all[1].1.success);

        let only = dispatcher.test_channels(Some("b")).await;
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].0, "b");
    }
}
