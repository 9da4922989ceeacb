//! CLI 子命令处理

pub mod output;
pub mod run;
pub mod send;
pub mod status;

pub use output::*;
pub use run::*;
pub use send::*;
pub use status::*;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use crate::config::RouterConfig;
use crate::notification::{NotificationRouter, RouterBuilder};

/// 加载配置并构建路由器
///
/// 未指定 `--config` 时使用 `~/.config/notify-hub/config.json`，文件不存在则使用默认配置。
pub fn load_router(config_path: Option<&Path>, dry_run: bool) -> Result<NotificationRouter> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(RouterConfig::default_path);
    debug!(path = %path.display(), "Loading router config");

    let config = RouterConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let router = RouterBuilder::new(config).dry_run(dry_run).build()?;
    Ok(router)
}
