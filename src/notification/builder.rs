//! 路由器构建器 - 根据配置创建渠道 adapter 并组装管道

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::aggregator::Aggregator;
use super::channel::NotificationChannel;
use super::channels::build_channel;
use super::dispatcher::NotificationDispatcher;
use super::dnd::DndSchedule;
use super::history::{HistoryLog, HistoryRecord};
use super::preference::PreferenceScorer;
use super::queue::DeliveryQueue;
use super::rate_limit::AdmissionController;
use super::registry::ChannelRegistry;
use super::router::{NotificationRouter, RouterState};
use super::rules::RuleMatcher;
use super::store::JsonlStore;
use crate::config::{ChannelConfig, RouterConfig};
use crate::error::{Result, RouterError};

/// 投递历史持久化位置
#[derive(Debug, Clone)]
enum HistoryLocation {
    /// 使用配置中的路径（默认 `~/.config/notify-hub/history.jsonl`）
    FromConfig,
    Path(PathBuf),
    /// 只保存在内存中
    Disabled,
}

/// 路由器构建器
pub struct RouterBuilder {
    config: RouterConfig,
    adapters: Vec<Arc<dyn NotificationChannel>>,
    dry_run: bool,
    history: HistoryLocation,
}

impl RouterBuilder {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            adapters: Vec::new(),
            dry_run: false,
            history: HistoryLocation::FromConfig,
        }
    }

    /// 注入一个现成的 adapter（优先于配置中的 adapter）
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.adapters.push(channel);
        self
    }

    /// 设置 dry-run 模式
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 指定投递历史文件
    pub fn history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history = HistoryLocation::Path(path.into());
        self
    }

    /// 不持久化投递历史
    pub fn without_history(mut self) -> Self {
        self.history = HistoryLocation::Disabled;
        self
    }

    /// 校验配置并构建路由器
    pub fn build(self) -> Result<NotificationRouter> {
        let config = self.config;
        config.validate()?;

        let mut dispatcher = NotificationDispatcher::new().with_dry_run(self.dry_run);
        let injected: Vec<String> = self.adapters.iter().map(|a| a.name().to_string()).collect();
        for adapter in self.adapters {
            dispatcher.register_channel(adapter);
        }

        let mut registry = ChannelRegistry::new();
        for (name, channel_config) in &config.channels {
            let adapter_ready = if let Some(existing) = dispatcher.get(name) {
                existing.is_enabled()
            } else if let Some(adapter_config) = &channel_config.adapter {
                let adapter = build_channel(name, adapter_config)
                    .map_err(|e| RouterError::invalid(format!("channels.{}: {}", name, e)))?;
                let ready = adapter.is_enabled();
                dispatcher.register_channel(adapter);
                ready
            } else {
                false
            };

            if channel_config.enabled && !adapter_ready {
                warn!(
                    channel = %name,
                    "Channel has no usable adapter, registering as disabled"
                );
            }

            registry.register(
                name.clone(),
                ChannelConfig {
                    enabled: channel_config.enabled && adapter_ready,
                    ..channel_config.clone()
                },
            );
        }

        // 注入但未出现在配置中的 adapter：启用、不限流
        for name in injected {
            if !registry.contains(&name) {
                debug!(channel = %name, "Registering injected channel without config");
                registry.register(name, ChannelConfig::enabled());
            }
        }

        let store = match self.history {
            HistoryLocation::FromConfig => Some(config.history_path()),
            HistoryLocation::Path(path) => Some(path),
            HistoryLocation::Disabled => None,
        }
        .map(|path| {
            let capacity = config.preferences.history_size;
            JsonlStore::new(path, capacity * 2).with_keep_after_cleanup(capacity)
        });

        let mut history = HistoryLog::new(config.preferences.history_size);
        if let Some(store) = &store {
            let records: Vec<HistoryRecord> = store.read_recent(config.preferences.history_size);
            if !records.is_empty() {
                info!(
                    path = %store.path().display(),
                    records = records.len(),
                    "Loaded delivery history"
                );
            }
            history.restore(records);
        }

        let mut scorer = PreferenceScorer::from_config(&config.preferences)?;
        scorer.rebuild(&history);

        let state = RouterState {
            matcher: RuleMatcher::from_config(&config.notification_rules, &config.default_channels),
            admission: AdmissionController::new(config.global_rate_limit),
            dnd: DndSchedule::from_config(&config.dnd_mode)?,
            aggregator: Aggregator::new(&config.aggregation),
            scorer,
            history,
            queue: DeliveryQueue::new(),
            registry,
        };

        info!(
            channels = state.registry.len(),
            enabled = state.registry.enabled_channels().len(),
            dry_run = self.dry_run,
            "Notification router ready"
        );

        Ok(NotificationRouter::from_parts(
            state,
            dispatcher,
            store,
            Duration::from_millis(config.tick_interval_ms),
        ))
    }
}
