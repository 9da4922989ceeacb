//! `nhub send` - 发送单条通知

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::Path;

use super::output::{format_outcome, format_tick, print_json};
use super::load_router;
use crate::notification::router::{NotifyOutcome, TickReport};
use crate::notification::{NotificationType, NotifyOptions, Priority};

#[derive(Debug, Args)]
pub struct SendArgs {
    /// 通知正文
    pub text: String,

    /// 通知类型: error / warning / info
    #[arg(long = "type", short = 't')]
    pub kind: Option<NotificationType>,

    /// 优先级: critical / high / medium / low（不指定时不参与优先级规则匹配）
    #[arg(long, short)]
    pub priority: Option<Priority>,

    /// 关键词，可重复
    #[arg(long = "keyword", short = 'k')]
    pub keywords: Vec<String>,

    /// 来源模块
    #[arg(long, short)]
    pub module: Option<String>,

    /// 显式指定渠道，可重复（跳过路由规则）
    #[arg(long = "channel", short = 'c')]
    pub channels: Vec<String>,

    /// 邮件类渠道使用的标题
    #[arg(long)]
    pub subject: Option<String>,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,

    /// 只走路由流程，不真正发送
    #[arg(long)]
    pub dry_run: bool,
}

impl SendArgs {
    pub fn to_options(&self) -> NotifyOptions {
        NotifyOptions {
            kind: self.kind,
            priority: self.priority,
            keywords: self.keywords.clone(),
            module: self.module.clone(),
            channels: if self.channels.is_empty() {
                None
            } else {
                Some(self.channels.clone())
            },
            subject: self.subject.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct SendReport {
    outcome: NotifyOutcome,
    /// 退出前刷新聚合分组和队列的结果
    flush: TickReport,
}

/// 处理 send 命令
///
/// 单次进程内没有调度器，发送后立即 `shutdown`，让聚合分组和限流队列在退出前处理完。
pub async fn handle_send(args: SendArgs, config_path: Option<&Path>) -> Result<()> {
    let router = load_router(config_path, args.dry_run)?;
    let outcome = router.notify(args.text.clone(), args.to_options()).await;
    let flush = router.shutdown().await;

    if args.json {
        return print_json(&SendReport { outcome, flush });
    }

    println!("{}", format_outcome(&outcome));
    if flush.flushed_groups > 0 || flush.drained_batches > 0 || flush.queue_size > 0 {
        println!("{}", format_tick(&flush));
    }
    Ok(())
}
