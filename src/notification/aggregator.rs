//! 通知聚合器 - 合并窗口内的相似通知
//!
//! ## 聚合策略
//! 1. 与每个未刷新分组的代表消息计算相似度，最高分 ≥ 阈值则加入该分组，否则新建分组
//! 2. 分组达到 `max_size` 时在 `offer` 中立即刷新
//! 3. 分组存在时间超过窗口时由调度器 tick 调用 `flush_expired` 刷新（不为每条消息起定时器）
//! 4. 退出前必须调用 `flush_all`，保证不丢消息
//!
//! 以下通知不参与聚合：critical 优先级、显式指定渠道、已经是聚合摘要的通知。

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

use super::message::Notification;
use super::priority::Priority;
use super::similarity::text_similarity;
use crate::config::AggregationConfig;

/// `offer` 的结果
#[derive(Debug, Clone)]
pub enum Offer {
    /// 不参与聚合，直接路由
    Immediate(Notification),
    /// 已放入分组，等待刷新
    Held,
    /// 分组已满，返回合并后的通知
    Flushed(Notification),
}

/// 待刷新的聚合分组
#[derive(Debug, Clone)]
pub struct AggregationGroup {
    pub representative: Notification,
    pub members: Vec<Notification>,
    pub window_started_at: DateTime<Local>,
}

impl AggregationGroup {
    fn new(notification: Notification, now: DateTime<Local>) -> Self {
        Self {
            representative: notification.clone(),
            members: vec![notification],
            window_started_at: now,
        }
    }

    /// 转换为一条通知；单成员分组原样返回
    fn into_notification(mut self, now: DateTime<Local>) -> Notification {
        let count = self.members.len();
        if count == 1 {
            return self.members.remove(0);
        }

        let rep = self.representative;
        let priority = self
            .members
            .iter()
            .filter_map(|m| m.priority)
            .max_by_key(Priority::severity);

        let mut summary = Notification::new(
            format!("{} (… and {} more similar)", rep.text, count - 1),
            now,
        )
        .with_kind(rep.kind)
        .with_keywords(&rep.keywords)
        .with_aggregation(count);
        summary.priority = priority;
        summary.module = rep.module;
        summary.extras = rep.extras;
        summary
    }
}

/// 分组概要（给 status 展示）
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub representative: String,
    pub size: usize,
    pub window_started_at: DateTime<Local>,
}

/// 通知聚合器
#[derive(Debug)]
pub struct Aggregator {
    enabled: bool,
    window_ms: i64,
    max_size: usize,
    similarity_threshold: f64,
    groups: Vec<AggregationGroup>,
}

impl Aggregator {
    pub fn new(config: &AggregationConfig) -> Self {
        Self {
            enabled: config.enabled,
            window_ms: config.window_ms,
            max_size: config.max_size.max(1),
            similarity_threshold: config.similarity_threshold.clamp(0.0, 1.0),
            groups: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 提交一条通知
    pub fn offer(&mut self, notification: Notification, now: DateTime<Local>) -> Offer {
        if !self.enabled
            || notification.priority == Some(Priority::Critical)
            || notification.requested_channels.is_some()
            || notification.is_aggregated()
        {
            return Offer::Immediate(notification);
        }

        let best = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, g)| (i, text_similarity(&g.representative.text, &notification.text)))
            .filter(|(_, score)| *score >= self.similarity_threshold)
            .fold(None, |best: Option<(usize, f64)>, (i, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((i, score)),
            });

        let index = match best {
            Some((index, score)) => {
                debug!(
                    notification_id = notification.id,
                    similarity = %format!("{:.2}", score),
                    "Notification joined aggregation group"
                );
                self.groups[index].members.push(notification);
                index
            }
            None => {
                self.groups.push(AggregationGroup::new(notification, now));
                self.groups.len() - 1
            }
        };

        if self.groups[index].members.len() >= self.max_size {
            let group = self.groups.remove(index);
            return Offer::Flushed(group.into_notification(now));
        }

        Offer::Held
    }

    /// 刷新已超过窗口的分组（按创建顺序）
    pub fn flush_expired(&mut self, now: DateTime<Local>) -> Vec<Notification> {
        let window_ms = self.window_ms;
        let (expired, open): (Vec<_>, Vec<_>) = self
            .groups
            .drain(..)
            .partition(|g| (now - g.window_started_at).num_milliseconds() >= window_ms);
        self.groups = open;

        expired.into_iter().map(|g| g.into_notification(now)).collect()
    }

    /// 刷新所有分组（退出时调用）
    pub fn flush_all(&mut self, now: DateTime<Local>) -> Vec<Notification> {
        self.groups
            .drain(..)
            .map(|g| g.into_notification(now))
            .collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// 所有分组中等待刷新的通知数
    pub fn pending_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    pub fn summaries(&self) -> Vec<GroupSummary> {
        self.groups
            .iter()
            .map(|g| GroupSummary {
                representative: g.representative.preview(80),
                size: g.members.len(),
                window_started_at: g.window_started_at,
            })
            .collect()
    }
}
