//! 准入控制 - 全局与按渠道的滑动窗口计数
//!
//! `try_admit` 只检查不计数；真正开始发送时调用 `commit` 才累加计数，
//! 这样一批渠道部分被限流时不会重复计数。
//!
//! 窗口规则：`now >= window_reset_at` 时窗口过期，下次 `commit` 把计数重置为 1，
//! 并把 `window_reset_at` 推进到 `now + window_ms`。

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::registry::ChannelRegistry;
use crate::config::RateLimitConfig;

/// 限流窗口的 key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LimitKey {
    Global,
    Channel(String),
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKey::Global => write!(f, "global"),
            LimitKey::Channel(name) => write!(f, "channel:{}", name),
        }
    }
}

/// 限流窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub count: u32,
    /// 毫秒时间戳
    pub window_reset_at: i64,
}

/// 准入结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    pub admitted: Vec<String>,
    pub blocked: Vec<String>,
}

impl Admission {
    pub fn all_blocked(&self) -> bool {
        self.admitted.is_empty()
    }
}

/// 窗口状态（给 status 展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub count: u32,
    pub max: u32,
    pub window_ms: i64,
    /// 距离窗口重置的剩余毫秒数（窗口已过期为 0）
    pub resets_in_ms: i64,
}

/// 准入控制器
#[derive(Debug, Default)]
pub struct AdmissionController {
    global: Option<RateLimitConfig>,
    windows: HashMap<LimitKey, RateLimitWindow>,
}

impl AdmissionController {
    pub fn new(global: Option<RateLimitConfig>) -> Self {
        Self {
            global,
            windows: HashMap::new(),
        }
    }

    /// 检查哪些渠道现在可以发送（不修改计数）
    ///
    /// 全局限流耗尽时整批渠道都被拒绝。
    pub fn try_admit(&self, channels: &[String], registry: &ChannelRegistry, now_ms: i64) -> Admission {
        let global_blocked = self
            .global
            .map(|limit| self.is_blocked(&LimitKey::Global, limit, now_ms))
            .unwrap_or(false);

        let mut admission = Admission::default();
        for channel in channels {
            let blocked = global_blocked
                || registry
                    .rate_limit_of(channel)
                    .map(|limit| self.is_blocked(&LimitKey::Channel(channel.clone()), limit, now_ms))
                    .unwrap_or(false);

            if blocked {
                admission.blocked.push(channel.clone());
            } else {
                admission.admitted.push(channel.clone());
            }
        }
        admission
    }

    /// 记录一次实际发送：全局计数 +1（按批次），每个渠道计数 +1
    pub fn commit(&mut self, channels: &[String], registry: &ChannelRegistry, now_ms: i64) {
        if channels.is_empty() {
            return;
        }

        if let Some(limit) = self.global {
            self.bump(LimitKey::Global, limit, now_ms);
        }

        for channel in channels {
            if let Some(limit) = registry.rate_limit_of(channel) {
                self.bump(LimitKey::Channel(channel.clone()), limit, now_ms);
            }
        }
    }

    /// 当前窗口内的有效计数（窗口不存在或已过期为 0）
    pub fn current_count(&self, key: &LimitKey, now_ms: i64) -> u32 {
        match self.windows.get(key) {
            Some(window) if now_ms < window.window_reset_at => window.count,
            _ => 0,
        }
    }

    pub fn window(&self, key: &LimitKey) -> Option<&RateLimitWindow> {
        self.windows.get(key)
    }

    /// 所有已创建窗口的状态
    pub fn snapshot(&self, registry: &ChannelRegistry, now_ms: i64) -> BTreeMap<String, RateLimitStatus> {
        let mut out = BTreeMap::new();
        for (key, window) in &self.windows {
            let limit = match key {
                LimitKey::Global => self.global,
                LimitKey::Channel(name) => registry.rate_limit_of(name),
            };
            let Some(limit) = limit else { continue };

            out.insert(
                key.to_string(),
                RateLimitStatus {
                    count: self.current_count(key, now_ms),
                    max: limit.max,
                    window_ms: limit.window_ms,
                    resets_in_ms: (window.window_reset_at - now_ms).max(0),
                },
            );
        }
        out
    }

    fn is_blocked(&self, key: &LimitKey, limit: RateLimitConfig, now_ms: i64) -> bool {
        limit.max == 0 || self.current_count(key, now_ms) >= limit.max
    }

    fn bump(&mut self, key: LimitKey, limit: RateLimitConfig, now_ms: i64) {
        let window = self.windows.entry(key).or_insert(RateLimitWindow {
            count: 0,
            window_reset_at: now_ms,
        });

        if now_ms >= window.window_reset_at {
            window.count = 1;
            window.window_reset_at = now_ms + limit.window_ms;
        } else {
            window.count += 1;
        }
    }
}
