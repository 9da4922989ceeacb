//! 通知路由器 - 管道入口
//!
//! 一条通知的流程：DND 检查 → 聚合 → 规则选渠道 + 偏好排序 → 准入检查
//! → 已准入渠道立即并发发送，被限流的渠道进入队列 → 结果写入投递历史。
//!
//! 所有可变状态（限流窗口、聚合分组、队列、历史、偏好）都在同一把锁里。
//! 锁只在同步代码段中持有，发送期间不持锁；准入计数在开始发送前、同一把锁内提交，
//! 所以并发的 `notify` 不会超额放行。

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::aggregator::{Aggregator, GroupSummary, Offer};
use super::channel::ChannelTestReport;
use super::dispatcher::{DeliveryOutcome, DeliveryResult, NotificationDispatcher};
use super::dnd::{should_suppress, DndSchedule};
use super::history::{Feedback, HistoryLog, HistoryRecord};
use super::message::{Notification, NotifyOptions};
use super::preference::{ChannelPreference, PreferenceScorer};
use super::queue::{DeliveryQueue, QueueEntrySummary, QueuedDelivery, ReadyBatch};
use super::rate_limit::{AdmissionController, RateLimitStatus};
use super::registry::ChannelRegistry;
use super::rules::RuleMatcher;
use super::store::JsonlStore;
use crate::config::RateLimitConfig;

/// `notify` 的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    /// 已处理（可能部分渠道失败或进入队列）
    Delivered(DeliveryResult),
    /// 被免打扰丢弃
    Suppressed,
    /// 已放入聚合分组，稍后以摘要形式发送
    Aggregated,
}

impl NotifyOutcome {
    pub fn delivery(&self) -> Option<&DeliveryResult> {
        match self {
            NotifyOutcome::Delivered(result) => Some(result),
            _ => None,
        }
    }
}

/// 一次 tick 的处理结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    /// 刷新的聚合分组数
    pub flushed_groups: usize,
    /// 从队列取出并发送的批次数
    pub drained_batches: usize,
    pub deliveries: Vec<DeliveryResult>,
    /// tick 结束时队列长度
    pub queue_size: usize,
}

/// 单个渠道的状态
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

/// 路由器状态快照（只读）
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub channels: BTreeMap<String, ChannelStatus>,
    pub queue_size: usize,
    pub queue: Vec<QueueEntrySummary>,
    pub rate_limits: BTreeMap<String, RateLimitStatus>,
    pub pending_groups: Vec<GroupSummary>,
    pub history_size: usize,
    pub preferences: Vec<ChannelPreference>,
    pub dnd_active: bool,
    pub dry_run: bool,
}

/// 锁保护的全部可变状态
pub(crate) struct RouterState {
    pub(crate) registry: ChannelRegistry,
    pub(crate) matcher: RuleMatcher,
    pub(crate) admission: AdmissionController,
    pub(crate) dnd: DndSchedule,
    pub(crate) aggregator: Aggregator,
    pub(crate) scorer: PreferenceScorer,
    pub(crate) history: HistoryLog,
    pub(crate) queue: DeliveryQueue,
}

/// 在锁内做出的发送计划
struct DeliveryPlan {
    notification: Notification,
    /// 已提交准入计数，马上发送
    admitted: Vec<String>,
    /// 已进入队列
    queued: Vec<String>,
}

impl RouterState {
    /// 选渠道、排序、准入并提交计数；被限流的渠道入队
    ///
    /// 没有任何可用渠道时返回 None。
    fn plan(&mut self, notification: Notification, now: DateTime<Local>) -> Option<DeliveryPlan> {
        let now_ms = now.timestamp_millis();
        let explicit = notification.requested_channels.clone();

        let selected = self
            .matcher
            .select_channels(&notification, explicit.as_deref(), &self.registry);
        if selected.is_empty() {
            return None;
        }

        // 显式指定的渠道不参与重排
        let ranked = if explicit.is_some() {
            selected
        } else {
            self.scorer.rank(&selected, &notification, &self.history, now)
        };

        let admission = self.admission.try_admit(&ranked, &self.registry, now_ms);
        self.admission.commit(&admission.admitted, &self.registry, now_ms);

        if !admission.blocked.is_empty() {
            debug!(
                notification_id = notification.id,
                channels = ?admission.blocked,
                "Rate limited, queued for later"
            );
            self.queue.push_back(QueuedDelivery::new(
                notification.clone(),
                admission.blocked.clone(),
                now,
            ));
        }

        Some(DeliveryPlan {
            notification,
            admitted: admission.admitted,
            queued: admission.blocked,
        })
    }

    /// 从队列取出现在可以发送的批次（计数已提交）
    fn drain_queue(&mut self, now: DateTime<Local>) -> Vec<ReadyBatch> {
        let now_ms = now.timestamp_millis();
        let RouterState {
            queue,
            admission,
            registry,
            ..
        } = self;

        queue.drain(|item| {
            let result = admission.try_admit(&item.channels, registry, now_ms);
            admission.commit(&result.admitted, registry, now_ms);
            result
        })
    }
}

/// 通知路由器
pub struct NotificationRouter {
    state: Mutex<RouterState>,
    dispatcher: NotificationDispatcher,
    store: Option<JsonlStore>,
    /// 串行化 "修改历史 + 写文件"，避免整体重写覆盖并发追加的记录
    persist: Mutex<()>,
    tick_interval: Duration,
}

impl NotificationRouter {
    pub(crate) fn from_parts(
        state: RouterState,
        dispatcher: NotificationDispatcher,
        store: Option<JsonlStore>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            dispatcher,
            store,
            persist: Mutex::new(()),
            tick_interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 调度器 tick 间隔
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn is_dry_run(&self) -> bool {
        self.dispatcher.is_dry_run()
    }

    /// 提交一条通知
    pub async fn notify(&self, text: impl Into<String>, options: NotifyOptions) -> NotifyOutcome {
        self.notify_at(text, options, Local::now()).await
    }

    /// 提交一条通知（指定当前时间）
    pub async fn notify_at(
        &self,
        text: impl Into<String>,
        options: NotifyOptions,
        now: DateTime<Local>,
    ) -> NotifyOutcome {
        let notification = Notification::from_options(text, options, now);
        let id = notification.id;

        let planned = {
            let mut state = self.lock();

            if should_suppress(&notification, &state.dnd, now) {
                debug!(notification_id = id, "Notification suppressed by DND");
                return NotifyOutcome::Suppressed;
            }

            let ready = match state.aggregator.offer(notification, now) {
                Offer::Held => {
                    debug!(notification_id = id, "Notification held for aggregation");
                    return NotifyOutcome::Aggregated;
                }
                Offer::Immediate(n) => n,
                Offer::Flushed(summary) => {
                    debug!(
                        notification_id = summary.id,
                        count = summary.aggregation.map(|a| a.count).unwrap_or(1),
                        "Aggregation group full, flushing"
                    );
                    summary
                }
            };

            state.plan(ready, now)
        };

        let result = match planned {
            Some(plan) => self.deliver(plan, now).await,
            None => {
                warn!(notification_id = id, "No channels selected for notification");
                DeliveryResult::no_channels()
            }
        };
        NotifyOutcome::Delivered(result)
    }

    /// 周期性处理：先排空队列，再刷新到期的聚合分组
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Local::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Local>) -> TickReport {
        let (batches, plans, flushed_groups) = {
            let mut state = self.lock();
            let batches = state.drain_queue(now);
            let flushed = state.aggregator.flush_expired(now);
            let flushed_groups = flushed.len();
            let plans: Vec<Option<DeliveryPlan>> =
                flushed.into_iter().map(|n| state.plan(n, now)).collect();
            (batches, plans, flushed_groups)
        };

        self.run_tick(batches, plans, flushed_groups, now).await
    }

    /// 退出前调用：刷新所有聚合分组并做最后一次队列排空
    pub async fn shutdown(&self) -> TickReport {
        self.shutdown_at(Local::now()).await
    }

    pub async fn shutdown_at(&self, now: DateTime<Local>) -> TickReport {
        let (batches, plans, flushed_groups) = {
            let mut state = self.lock();
            let batches = state.drain_queue(now);
            let flushed = state.aggregator.flush_all(now);
            let flushed_groups = flushed.len();
            let plans: Vec<Option<DeliveryPlan>> =
                flushed.into_iter().map(|n| state.plan(n, now)).collect();
            (batches, plans, flushed_groups)
        };

        let report = self.run_tick(batches, plans, flushed_groups, now).await;
        if report.queue_size > 0 {
            warn!(
                queue_size = report.queue_size,
                "Shutting down with rate-limited notifications still queued"
            );
        } else {
            info!("Router shut down, all notifications handled");
        }
        report
    }

    async fn run_tick(
        &self,
        batches: Vec<ReadyBatch>,
        plans: Vec<Option<DeliveryPlan>>,
        flushed_groups: usize,
        now: DateTime<Local>,
    ) -> TickReport {
        let mut report = TickReport {
            flushed_groups,
            drained_batches: batches.len(),
            ..Default::default()
        };

        for batch in batches {
            let plan = DeliveryPlan {
                notification: batch.notification,
                admitted: batch.channels,
                queued: Vec::new(),
            };
            report.deliveries.push(self.deliver(plan, now).await);
        }

        for plan in plans {
            match plan {
                Some(plan) => report.deliveries.push(self.deliver(plan, now).await),
                None => {
                    warn!("No channels selected for flushed aggregation summary");
                    report.deliveries.push(DeliveryResult::no_channels());
                }
            }
        }

        report.queue_size = self.lock().queue.len();
        report
    }

    /// 发送已准入的渠道（不持锁），并写入投递历史
    async fn deliver(&self, plan: DeliveryPlan, now: DateTime<Local>) -> DeliveryResult {
        let DeliveryPlan {
            notification,
            admitted,
            queued,
        } = plan;

        let outcomes = if admitted.is_empty() {
            Vec::new()
        } else {
            self.dispatcher.dispatch(&notification, &admitted).await
        };

        let history_id = self.record(&notification, &outcomes, now);
        let mut result = DeliveryResult::from_outcomes(outcomes, queued);
        result.history_id = history_id;

        if result.is_partial() {
            warn!(
                notification_id = notification.id,
                successful = result.successful,
                failed = result.failed,
                "Notification partially delivered"
            );
        }
        result
    }

    /// 记录一次实际发送
    fn record(
        &self,
        notification: &Notification,
        outcomes: &[DeliveryOutcome],
        now: DateTime<Local>,
    ) -> Option<u64> {
        if outcomes.is_empty() {
            return None;
        }

        let channels: Vec<String> = outcomes.iter().map(|o| o.channel.clone()).collect();
        let _persist = self.persist.lock().unwrap_or_else(|e| e.into_inner());
        let record = {
            let mut state = self.lock();
            let feedback_before = state.history.feedback_count();
            let id = state
                .history
                .push(now.with_timezone(&Utc), notification.text.clone(), channels);
            // 被挤出环形缓冲区的记录带有反馈时，偏好需要与剩余历史保持一致
            if state.history.feedback_count() < feedback_before {
                let RouterState { scorer, history, .. } = &mut *state;
                scorer.rebuild(history);
            }
            let record = state.history.get(id).cloned();
            record
        }?;

        if let Some(store) = &self.store {
            if let Err(e) = store.append(&record) {
                warn!(path = %store.path().display(), error = %e, "Failed to persist delivery history");
            }
        }
        Some(record.id)
    }

    /// 为历史记录附加反馈并更新渠道偏好
    ///
    /// 记录不存在（或已被覆盖）时返回 `Ok(false)`。同一条记录重复给出相同反馈不会重复计数，
    /// 改变反馈时偏好按当前历史重新计算，与重启后 `rebuild` 的结果一致。
    pub fn record_feedback(&self, history_id: u64, feedback: Feedback) -> Result<bool> {
        let _persist = self.persist.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot: Vec<HistoryRecord> = {
            let mut state = self.lock();
            match state.history.set_feedback(history_id, feedback) {
                None => return Ok(false),
                Some(Some(previous)) if previous == feedback => {
                    debug!(history_id, feedback = ?feedback, "Feedback unchanged");
                    return Ok(true);
                }
                Some(_) => {}
            }
            let RouterState { scorer, history, .. } = &mut *state;
            scorer.rebuild(history);
            let snapshot = state.history.iter().cloned().collect();
            snapshot
        };

        if let Some(store) = &self.store {
            store.rewrite(&snapshot)?;
        }

        info!(history_id, feedback = ?feedback, "Feedback recorded");
        Ok(true)
    }

    /// 最近 N 条投递历史（最旧在前）
    pub fn history(&self, limit: usize) -> Vec<HistoryRecord> {
        self.lock().history.recent(limit).into_iter().cloned().collect()
    }

    /// 对渠道做自检
    pub async fn test_channels(&self, only: Option<&str>) -> Vec<(String, ChannelTestReport)> {
        self.dispatcher.test_channels(only).await
    }

    pub fn status(&self) -> RouterStatus {
        self.status_at(Local::now())
    }

    /// 状态快照
    pub fn status_at(&self, now: DateTime<Local>) -> RouterStatus {
        let state = self.lock();

        let channels = state
            .registry
            .iter()
            .map(|(name, config)| {
                let status = ChannelStatus {
                    enabled: config.enabled,
                    channel_type: self
                        .dispatcher
                        .get(name)
                        .map(|c| c.channel_type().to_string()),
                    rate_limit: config.rate_limit,
                };
                (name.to_string(), status)
            })
            .collect();

        let blank = Notification::new("", now);

        RouterStatus {
            channels,
            queue_size: state.queue.len(),
            queue: state.queue.summaries(),
            rate_limits: state.admission.snapshot(&state.registry, now.timestamp_millis()),
            pending_groups: state.aggregator.summaries(),
            history_size: state.history.len(),
            preferences: state.scorer.preferences(),
            dnd_active: should_suppress(&blank, &state.dnd, now),
            dry_run: self.dispatcher.is_dry_run(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, RouterConfig, RuleConfig};
    use crate::notification::builder::RouterBuilder;
    use crate::notification::channel::{NotificationChannel, SendResult};
    use crate::notification::priority::{NotificationType, Priority};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Arc;

    struct CountingChannel {
        name: String,
        sent: Mutex<Vec<String>>,
    }

    impl CountingChannel {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        fn channel_type(&self) -> &str {
            "counting"
        }

        async fn send(&self, notification: &Notification) -> anyhow::Result<SendResult> {
            self.sent.lock().unwrap().push(notification.text.clone());
            Ok(SendResult::Sent)
        }
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn config() -> RouterConfig {
        let mut config = RouterConfig::default();
        config.channels.clear();
        config
            .channels
            .insert("slack".to_string(), ChannelConfig::enabled().with_rate_limit(2, 60_000));
        config.channels.insert("telegram".to_string(), ChannelConfig::enabled());
        config.notification_rules = vec![RuleConfig {
            kind: Some(NotificationType::Error),
            channels: vec!["telegram".to_string(), "slack".to_string()],
            ..Default::default()
        }];
        config.default_channels = vec!["slack".to_string()];
        config
    }

    fn router(slack: &Arc<CountingChannel>, telegram: &Arc<CountingChannel>) -> NotificationRouter {
        RouterBuilder::new(config())
            .with_channel(slack.clone())
            .with_channel(telegram.clone())
            .without_history()
            .build()
            .unwrap()
    }

    fn error_opts() -> NotifyOptions {
        NotifyOptions {
            kind: Some(NotificationType::Error),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_rule_routes_to_both_channels() {
        let slack = CountingChannel::new("slack");
        let telegram = CountingChannel::new("telegram");
        let router = router(&slack, &telegram);

        let outcome = router.notify_at("build failed", error_opts(), noon()).await;
        let result = outcome.delivery().unwrap();
        assert_eq!((result.successful, result.failed, result.total), (2, 0, 2));
        assert_eq!(result.outcomes[0].channel, "telegram");
        assert!(result.history_id.is_some());
        assert_eq!(slack.sent(), vec!["build failed"]);
        assert_eq!(telegram.sent(), vec!["build failed"]);
    }

    #[tokio::test]
    async fn test_unmatched_uses_default_channels() {
        let slack = CountingChannel::new("slack");
        let telegram = CountingChannel::new("telegram");
        let router = router(&slack, &telegram);

        router.notify_at("fyi", NotifyOptions::default(), noon()).await;
        assert_eq!(slack.sent(), vec!["fyi"]);
        assert!(telegram.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_channel_is_queued_then_drained() {
        let slack = CountingChannel::new("slack");
        let telegram = CountingChannel::new("telegram");
        let router = router(&slack, &telegram);

        for i in 0..3 {
            router.notify_at(format!("m{}", i), error_opts(), noon()).await;
        }
        assert_eq!(slack.sent().len(), 2);
        assert_eq!(telegram.sent().len(), 3);
        assert_eq!(router.status_at(noon()).queue_size, 1);

        // 窗口内 tick 不会放行
        let report = router.tick_at(noon() + chrono::Duration::seconds(30)).await;
        assert_eq!(report.drained_batches, 0);
        assert_eq!(report.queue_size, 1);

        let report = router.tick_at(noon() + chrono::Duration::seconds(60)).await;
        assert_eq!(report.drained_batches, 1);
        assert_eq!(report.queue_size, 0);
        assert_eq!(slack.sent(), vec!["m0", "m1", "m2"]);
    }

    #[tokio::test]
    async fn test_explicit_unknown_channel_yields_no_channels() {
        let slack = CountingChannel::new("slack");
        let telegram = CountingChannel::new("telegram");
        let router = router(&slack, &telegram);

        let options = NotifyOptions {
            channels: Some(vec!["email".to_string()]),
            ..Default::default()
        };
        let outcome = router.notify_at("x", options, noon()).await;
        let result = outcome.delivery().unwrap();
        assert_eq!((result.successful, result.failed, result.total), (0, 1, 0));
    }

    #[tokio::test]
    async fn test_feedback_updates_preferences() {
        let slack = CountingChannel::new("slack");
        let telegram = CountingChannel::new("telegram");
        let router = router(&slack, &telegram);

        let outcome = router.notify_at("deploy done", NotifyOptions::default(), noon()).await;
        let id = outcome.delivery().unwrap().history_id.unwrap();

        assert!(router.record_feedback(id, Feedback::Positive).unwrap());
        assert!(!router.record_feedback(9_999, Feedback::Positive).unwrap());

        let status = router.status_at(noon());
        assert_eq!(status.history_size, 1);
        assert_eq!(status.preferences.len(), 1);
        assert_eq!(status.preferences[0].channel, "slack");
        assert_eq!(router.history(10)[0].feedback, Some(Feedback::Positive));
    }

    #[tokio::test]
    async fn test_repeated_feedback_matches_rebuilt_preferences() {
        let slack = CountingChannel::new("slack");
        let telegram = CountingChannel::new("telegram");
        let router = router(&slack, &telegram);

        let outcome = router.notify_at("deploy done", NotifyOptions::default(), noon()).await;
        let id = outcome.delivery().unwrap().history_id.unwrap();

        for _ in 0..3 {
            assert!(router.record_feedback(id, Feedback::Positive).unwrap());
        }
        assert!(router.record_feedback(id, Feedback::Negative).unwrap());

        let live = router.status_at(noon()).preferences;
        assert_eq!(live.len(), 1);
        assert!((live[0].score - 0.4).abs() < 1e-9);
        assert_eq!(live[0].sample_count, 1);

        // 重启后从历史重建的偏好必须相同
        let mut restored = HistoryLog::new(100);
        restored.restore(router.history(100));
        let mut rebuilt =
            PreferenceScorer::from_config(&crate::config::PreferenceConfig::default()).unwrap();
        rebuilt.rebuild(&restored);
        assert_eq!(rebuilt.preferences(), live);
    }

    #[tokio::test]
    async fn test_evicted_feedback_is_forgotten() {
        let slack = CountingChannel::new("slack");
        let telegram = CountingChannel::new("telegram");
        let mut config = config();
        config.preferences.history_size = 2;
        let router = RouterBuilder::new(config)
            .with_channel(slack.clone())
            .with_channel(telegram.clone())
            .without_history()
            .build()
            .unwrap();

        let later = noon() + chrono::Duration::minutes(5);
        let first = router.notify_at("a", NotifyOptions::default(), noon()).await;
        let id = first.delivery().unwrap().history_id.unwrap();
        assert!(router.record_feedback(id, Feedback::Negative).unwrap());
        assert_eq!(router.status_at(noon()).preferences.len(), 1);

        router.notify_at("b", NotifyOptions::default(), later).await;
        router.notify_at("c", NotifyOptions::default(), later).await;
        assert!(router.status_at(later).preferences.is_empty());
    }

    #[tokio::test]
    async fn test_history_uses_injected_time() {
        let slack = CountingChannel::new("slack");
        let telegram = CountingChannel::new("telegram");
        let router = router(&slack, &telegram);

        router.notify_at("fyi", NotifyOptions::default(), noon()).await;
        assert_eq!(router.history(1)[0].ts, noon().with_timezone(&Utc));

        let later = noon() + chrono::Duration::hours(3);
        router.notify_at("late", error_opts(), later).await;
        assert_eq!(router.history(1)[0].ts, later.with_timezone(&Utc));
    }

    #[tokio::test]
    async fn test_status_reports_channels_and_limits() {
        let slack = CountingChannel::new("slack");
        let telegram = CountingChannel::new("telegram");
        let router = router(&slack, &telegram);

        let options = NotifyOptions {
            priority: Some(Priority::Low),
            ..Default::default()
        };
        router.notify_at("hello", options, noon()).await;

        let status = router.status_at(noon());
        assert_eq!(status.channels.len(), 2);
        assert_eq!(status.channels["slack"].channel_type.as_deref(), Some("counting"));
        assert_eq!(status.rate_limits["channel:slack"].count, 1);
        assert!(!status.dnd_active);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["channels"]["slack"]["rate_limit"]["max"], 2);
    }
}
