//! 配置加载与校验
//!
//! 配置文件是 JSON（camelCase），默认位于 `~/.config/notify-hub/config.json`。
//! 文件不存在时使用内置默认配置（只启用 local_file 渠道），非法配置在启动时直接拒绝。

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, RouterError};
use crate::notification::priority::{NotificationType, Priority};

/// 限流配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 窗口内允许的最大发送次数（0 表示总是拒绝）
    pub max: u32,
    /// 窗口长度（毫秒）
    #[serde(rename = "window")]
    pub window_ms: i64,
}

impl RateLimitConfig {
    pub fn new(max: u32, window_ms: i64) -> Self {
        Self { max, window_ms }
    }

    fn validate(&self, scope: &str) -> Result<()> {
        if self.window_ms <= 0 {
            return Err(RouterError::invalid(format!(
                "{}: rate limit window must be > 0ms, got {}",
                scope, self.window_ms
            )));
        }
        Ok(())
    }
}

/// Webhook 消息体格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookFormat {
    /// `{"text": ...}`，Slack incoming webhook
    Slack,
    /// `{"content": ...}`，Discord webhook
    Discord,
    /// `{"msgtype":"text","text":{"content":...}}`，企业微信/钉钉机器人
    Wechat,
    /// 完整的 Notification JSON
    #[default]
    Json,
}

/// 渠道 adapter 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterConfig {
    Webhook {
        url: String,
        #[serde(default)]
        format: WebhookFormat,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default = "default_timeout_secs", rename = "timeoutSecs")]
        timeout_secs: u64,
    },
    Telegram {
        #[serde(rename = "botToken")]
        bot_token: String,
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(default, rename = "apiBase")]
        api_base: Option<String>,
        #[serde(default = "default_timeout_secs", rename = "timeoutSecs")]
        timeout_secs: u64,
    },
    /// 通过 `openclaw message send` 转发（telegram/whatsapp/discord/slack/signal）
    Openclaw {
        #[serde(rename = "channelType")]
        channel_type: String,
        target: String,
        #[serde(default, rename = "openclawCmd")]
        openclaw_cmd: Option<String>,
    },
    /// 写入本地 JSONL 文件
    LocalFile {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

fn default_timeout_secs() -> u64 {
    30
}

/// 单个渠道配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<AdapterConfig>,
}

impl ChannelConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            rate_limit: None,
            adapter: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::enabled()
        }
    }

    pub fn with_rate_limit(mut self, max: u32, window_ms: i64) -> Self {
        self.rate_limit = Some(RateLimitConfig::new(max, window_ms));
        self
    }

    pub fn with_adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = Some(adapter);
        self
    }
}

fn default_true() -> bool {
    true
}

/// 路由规则配置（所有出现的条件都满足才匹配）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<String>,
    pub channels: Vec<String>,
}

/// 聚合配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// 聚合窗口（毫秒）
    #[serde(default = "default_aggregation_window", rename = "window")]
    pub window_ms: i64,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_aggregation_window() -> i64 {
    60_000
}

fn default_max_size() -> usize {
    10
}

fn default_similarity_threshold() -> f64 {
    0.8
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: default_aggregation_window(),
            max_size: default_max_size(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// `HH:MM` 时间段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// 解析为 (start, end)
    pub fn parse(&self) -> Result<(NaiveTime, NaiveTime)> {
        Ok((parse_clock(&self.start)?, parse_clock(&self.end)?))
    }
}

/// 解析 `HH:MM`
pub fn parse_clock(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| RouterError::invalid(format!("invalid time '{}': {}", value, e)))
}

/// DND 时间表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DndScheduleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_hours: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_hours: Option<TimeRange>,
}

/// 免打扰配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DndConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub schedule: DndScheduleConfig,
    /// 不受 DND 影响的优先级
    #[serde(default = "default_exceptions")]
    pub exceptions: Vec<Priority>,
    /// 工作时间只放行与工作相关的通知
    #[serde(default)]
    pub auto_detect: bool,
    #[serde(default = "default_work_keywords")]
    pub work_keywords: Vec<String>,
}

fn default_exceptions() -> Vec<Priority> {
    vec![Priority::Critical]
}

fn default_work_keywords() -> Vec<String> {
    [
        "error", "fail", "failed", "build", "deploy", "test", "review", "merge", "commit",
        "bug", "crash", "session", "agent",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for DndConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: DndScheduleConfig::default(),
            exceptions: default_exceptions(),
            auto_detect: false,
            work_keywords: default_work_keywords(),
        }
    }
}

/// 渠道偏好学习配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceConfig {
    /// 至少有这么多条带反馈的历史才启用重排
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// 历史环形缓冲区容量
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// 历史记录与当前通知的相似度阈值
    #[serde(default = "default_history_similarity")]
    pub similarity_threshold: f64,
    /// 夜间优先的静默渠道
    #[serde(default = "default_silent_channels")]
    pub silent_channels: Vec<String>,
    #[serde(default = "default_night_hours")]
    pub night_hours: TimeRange,
    /// 排序后最多发送到几个渠道（None 表示不限）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_channels: Option<usize>,
}

fn default_min_samples() -> usize {
    5
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_history_size() -> usize {
    100
}

fn default_history_similarity() -> f64 {
    0.5
}

fn default_silent_channels() -> Vec<String> {
    vec!["email".to_string()]
}

fn default_night_hours() -> TimeRange {
    TimeRange::new("22:00", "07:00")
}

impl Default for PreferenceConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            learning_rate: default_learning_rate(),
            history_size: default_history_size(),
            similarity_threshold: default_history_similarity(),
            silent_channels: default_silent_channels(),
            night_hours: default_night_hours(),
            max_channels: None,
        }
    }
}

/// 路由器完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_rate_limit: Option<RateLimitConfig>,
    /// 渠道按名称排序，"第一个启用的渠道" 因此是确定的
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,
    #[serde(default)]
    pub default_channels: Vec<String>,
    #[serde(default)]
    pub notification_rules: Vec<RuleConfig>,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub dnd_mode: DndConfig,
    #[serde(default)]
    pub preferences: PreferenceConfig,
    /// 调度器 tick 间隔（毫秒）
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// 投递历史文件，默认 `~/.config/notify-hub/history.jsonl`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,
}

fn default_tick_interval() -> u64 {
    2_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(
            "local_file".to_string(),
            ChannelConfig::enabled().with_adapter(AdapterConfig::LocalFile { path: None }),
        );

        Self {
            global_rate_limit: None,
            channels,
            default_channels: Vec::new(),
            notification_rules: Vec::new(),
            aggregation: AggregationConfig::default(),
            dnd_mode: DndConfig::default(),
            preferences: PreferenceConfig::default(),
            tick_interval_ms: default_tick_interval(),
            history_path: None,
        }
    }
}

impl RouterConfig {
    /// 配置目录 `~/.config/notify-hub`
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("notify-hub")
    }

    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// 从文件加载并校验
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// 文件不存在时返回默认配置
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: RouterConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 历史文件路径
    pub fn history_path(&self) -> PathBuf {
        self.history_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("history.jsonl"))
    }

    /// 校验配置，非法时返回 `InvalidConfiguration`
    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = &self.global_rate_limit {
            limit.validate("globalRateLimit")?;
        }

        for (name, channel) in &self.channels {
            if name.trim().is_empty() {
                return Err(RouterError::invalid("channel name must not be empty"));
            }
            if let Some(limit) = &channel.rate_limit {
                limit.validate(&format!("channels.{}", name))?;
            }
        }

        for (index, rule) in self.notification_rules.iter().enumerate() {
            if rule.channels.is_empty() {
                return Err(RouterError::invalid(format!(
                    "notificationRules[{}]: channels must not be empty",
                    index
                )));
            }
        }

        let aggregation = &self.aggregation;
        if aggregation.window_ms <= 0 {
            return Err(RouterError::invalid("aggregation.window must be > 0ms"));
        }
        if aggregation.max_size == 0 {
            return Err(RouterError::invalid("aggregation.maxSize must be >= 1"));
        }
        if !(0.0..=1.0).contains(&aggregation.similarity_threshold) {
            return Err(RouterError::invalid(
                "aggregation.similarityThreshold must be within [0, 1]",
            ));
        }

        if let Some(range) = &self.dnd_mode.schedule.work_hours {
            range.parse()?;
        }
        if let Some(range) = &self.dnd_mode.schedule.sleep_hours {
            range.parse()?;
        }

        let prefs = &self.preferences;
        if !(prefs.learning_rate > 0.0 && prefs.learning_rate <= 1.0) {
            return Err(RouterError::invalid("preferences.learningRate must be within (0, 1]"));
        }
        if prefs.history_size == 0 {
            return Err(RouterError::invalid("preferences.historySize must be >= 1"));
        }
        if !(0.0..=1.0).contains(&prefs.similarity_threshold) {
            return Err(RouterError::invalid(
                "preferences.similarityThreshold must be within [0, 1]",
            ));
        }
        prefs.night_hours.parse()?;

        if self.tick_interval_ms == 0 {
            return Err(RouterError::invalid("tickIntervalMs must be > 0"));
        }

        Ok(())
    }
}
