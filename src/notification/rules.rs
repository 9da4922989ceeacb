//! 路由规则匹配 - 决定通知发往哪些渠道
//!
//! # 匹配顺序
//! 1. 调用方显式指定渠道：与已启用渠道取交集后直接返回
//! 2. 遍历所有规则：规则上出现的条件全部满足才算匹配，缺省条件视为通配；
//!    所有匹配规则的目标渠道取并集
//! 3. 没有规则匹配：使用默认渠道；默认渠道也为空时取第一个启用的渠道

use super::message::Notification;
use super::priority::{NotificationType, Priority};
use super::registry::ChannelRegistry;
use crate::config::RuleConfig;
use tracing::debug;

/// 路由规则
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    pub match_type: Option<NotificationType>,
    pub match_priority: Option<Priority>,
    /// 小写
    pub match_keywords: Vec<String>,
    pub match_modules: Vec<String>,
    /// 有序、去重
    pub target_channels: Vec<String>,
}

impl Rule {
    /// 判断规则是否匹配通知
    pub fn matches(&self, notification: &Notification) -> bool {
        if let Some(kind) = self.match_type {
            if notification.notification_type() != Some(kind) {
                return false;
            }
        }

        if let Some(priority) = self.match_priority {
            if notification.priority != Some(priority) {
                return false;
            }
        }

        if !self.match_keywords.is_empty() {
            let text = notification.text.to_lowercase();
            if !self.match_keywords.iter().any(|k| text.contains(k.as_str())) {
                return false;
            }
        }

        if !self.match_modules.is_empty() {
            match &notification.module {
                Some(module) if self.match_modules.iter().any(|m| m == module) => {}
                _ => return false,
            }
        }

        true
    }
}

impl From<RuleConfig> for Rule {
    fn from(config: RuleConfig) -> Self {
        Self {
            match_type: config.kind,
            match_priority: config.priority,
            match_keywords: config
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            match_modules: config.modules,
            target_channels: dedup(config.channels),
        }
    }
}

/// 规则匹配器
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<Rule>,
    default_channels: Vec<String>,
}

impl RuleMatcher {
    pub fn new(rules: Vec<Rule>, default_channels: Vec<String>) -> Self {
        Self {
            rules,
            default_channels: dedup(default_channels),
        }
    }

    pub fn from_config(rules: &[RuleConfig], default_channels: &[String]) -> Self {
        Self::new(
            rules.iter().cloned().map(Rule::from).collect(),
            default_channels.to_vec(),
        )
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// 选择目标渠道（结果有序、去重、只包含已启用渠道）
    pub fn select_channels(
        &self,
        notification: &Notification,
        explicit: Option<&[String]>,
        registry: &ChannelRegistry,
    ) -> Vec<String> {
        if let Some(explicit) = explicit {
            return enabled_only(explicit.iter(), registry);
        }

        let mut matched_any = false;
        let mut targets: Vec<&String> = Vec::new();
        for rule in &self.rules {
            if rule.matches(notification) {
                matched_any = true;
                targets.extend(rule.target_channels.iter());
            }
        }

        if matched_any {
            let selected = enabled_only(targets.into_iter(), registry);
            debug!(
                notification_id = notification.id,
                channels = ?selected,
                "Routing rules matched"
            );
            return selected;
        }

        let defaults = enabled_only(self.default_channels.iter(), registry);
        if !defaults.is_empty() {
            return defaults;
        }

        registry
            .enabled_channels()
            .first()
            .map(|first| vec![first.to_string()])
            .unwrap_or_default()
    }
}

fn enabled_only<'a>(
    channels: impl Iterator<Item = &'a String>,
    registry: &ChannelRegistry,
) -> Vec<String> {
    let mut selected: Vec<String> = Vec::new();
    for channel in channels {
        if registry.is_enabled(channel) && !selected.contains(channel) {
            selected.push(channel.clone());
        }
    }
    selected
}

fn dedup(channels: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(channels.len());
    for channel in channels {
        if !out.contains(&channel) {
            out.push(channel);
        }
    }
    out
}
