//! 错误类型
//!
//! `RouterError` 只在启动阶段（配置加载、历史文件读写）出现；
//! 单个渠道的投递失败用 `DeliveryError` 表示，被收集进 `DeliveryResult`，不会向上传播。

use thiserror::Error;

/// 启动/存储阶段的错误
#[derive(Debug, Error)]
pub enum RouterError {
    /// 配置非法（启动时拒绝，致命）
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RouterError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

/// 单次投递的失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryError {
    /// 规则匹配为空且没有任何可用的默认渠道
    #[error("No channels selected")]
    NoChannelsSelected,

    /// 渠道已配置但没有对应的 adapter
    #[error("Channel not found: {channel}")]
    ChannelNotFound { channel: String },

    /// adapter 发送失败
    #[error("Send to {channel} failed: {message}")]
    AdapterSendFailed { channel: String, message: String },
}

pub type Result<T> = std::result::Result<T, RouterError>;
