//! 渠道注册表 - 渠道启用状态与限流配置
//!
//! 只保存路由需要的配置数据；真正发送消息的 adapter 由 `NotificationDispatcher` 持有。
//! 查询未注册的渠道返回 "not found"（`None`/`false`），调用方可以静默过滤。

use crate::config::{ChannelConfig, RateLimitConfig};
use tracing::info;

/// 渠道注册表（保持注册顺序）
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    entries: Vec<(String, ChannelConfig)>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册渠道；同名渠道会被替换（保留原位置）
    pub fn register(&mut self, name: impl Into<String>, config: ChannelConfig) {
        let name = name.into();
        info!(channel = %name, enabled = config.enabled, "Registering channel");

        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = config;
        } else {
            self.entries.push((name, config));
        }
    }

    pub fn get(&self, name: &str) -> Option<&ChannelConfig> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 渠道是否启用（未注册返回 false）
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).map(|c| c.enabled).unwrap_or(false)
    }

    /// 渠道限流配置（未注册或未配置返回 None）
    pub fn rate_limit_of(&self, name: &str) -> Option<RateLimitConfig> {
        self.get(name).and_then(|c| c.rate_limit)
    }

    /// 所有已启用渠道（注册顺序）
    pub fn enabled_channels(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// 所有渠道名称（注册顺序）
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChannelConfig)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
