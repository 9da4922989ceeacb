//! 投递队列 - 暂存被限流的 (通知, 渠道) 对
//!
//! 只在内存中；进程重启后丢失。每个 tick 调用 `drain`：
//! - 最多检查入口时的 `len` 个条目
//! - 已准入的渠道交给调用方发送
//! - 仍被限流的渠道放回队尾，并结束本次 drain（下个 tick 再试）
//!
//! 条目只会被拆分，不会被丢弃或复制。

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;

use super::message::Notification;
use super::rate_limit::Admission;

/// 队列中的一条待发送记录
#[derive(Debug, Clone)]
pub struct QueuedDelivery {
    pub notification: Notification,
    /// 仍在等待的渠道
    pub channels: Vec<String>,
    pub enqueued_at: DateTime<Local>,
    /// 已尝试准入的次数
    pub attempts: u32,
}

impl QueuedDelivery {
    pub fn new(notification: Notification, channels: Vec<String>, enqueued_at: DateTime<Local>) -> Self {
        Self {
            notification,
            channels,
            enqueued_at,
            attempts: 0,
        }
    }
}

/// 可以立即发送的批次
#[derive(Debug, Clone)]
pub struct ReadyBatch {
    pub notification: Notification,
    pub channels: Vec<String>,
}

/// 队列条目概要（给 status 展示）
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntrySummary {
    pub notification_id: u64,
    pub preview: String,
    pub channels: Vec<String>,
    pub attempts: u32,
    pub enqueued_at: DateTime<Local>,
}

/// FIFO 投递队列
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    items: VecDeque<QueuedDelivery>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, item: QueuedDelivery) {
        if item.channels.is_empty() {
            return;
        }
        self.items.push_back(item);
    }

    pub fn pop_front(&mut self) -> Option<QueuedDelivery> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 所有条目中等待的渠道总数
    pub fn pending_channel_count(&self) -> usize {
        self.items.iter().map(|i| i.channels.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedDelivery> {
        self.items.iter()
    }

    pub fn summaries(&self) -> Vec<QueueEntrySummary> {
        self.items
            .iter()
            .map(|item| QueueEntrySummary {
                notification_id: item.notification.id,
                preview: item.notification.preview(80),
                channels: item.channels.clone(),
                attempts: item.attempts,
                enqueued_at: item.enqueued_at,
            })
            .collect()
    }

    /// 取出可以发送的批次
    ///
    /// `admit` 对一个条目做准入检查并提交计数，返回哪些渠道放行、哪些仍被限流。
    pub fn drain<F>(&mut self, mut admit: F) -> Vec<ReadyBatch>
    where
        F: FnMut(&QueuedDelivery) -> Admission,
    {
        let mut ready = Vec::new();
        let budget = self.items.len();

        for _ in 0..budget {
            let Some(mut item) = self.items.pop_front() else {
                break;
            };
            item.attempts += 1;

            let admission = admit(&item);
            let stop = !admission.blocked.is_empty();

            if !admission.admitted.is_empty() {
                ready.push(ReadyBatch {
                    notification: item.notification.clone(),
                    channels: admission.admitted,
                });
            }

            if stop {
                item.channels = admission.blocked;
                self.items.push_back(item);
                break;
            }
        }

        ready
    }
}
