//! `nhub run` - 常驻模式
//!
//! 从 stdin 逐行读取通知（JSON 对象或纯文本），由调度器周期刷新聚合分组和限流队列，
//! 读到 EOF 或收到 Ctrl-C 后停止调度并刷新剩余通知。

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::load_router;
use super::output::{format_outcome, format_tick, json_line};
use crate::notification::{NotifyOptions, Scheduler};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// 调度间隔（毫秒），默认使用配置中的 tickIntervalMs
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// 输出 JSON Lines
    #[arg(long)]
    pub json: bool,

    /// 只走路由流程，不真正发送
    #[arg(long)]
    pub dry_run: bool,
}

/// stdin 中的一行
#[derive(Debug, Deserialize)]
pub struct InputLine {
    pub text: String,
    #[serde(flatten)]
    pub options: NotifyOptions,
}

/// 解析输入行，非 JSON 的行整体作为通知正文
pub fn parse_input_line(line: &str) -> Result<Option<InputLine>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('{') {
        let input: InputLine =
            serde_json::from_str(line).context("Invalid notification JSON")?;
        return Ok(Some(input));
    }
    Ok(Some(InputLine {
        text: line.to_string(),
        options: NotifyOptions::default(),
    }))
}

/// 处理 run 命令
pub async fn handle_run(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let router = Arc::new(load_router(config_path, args.dry_run)?);
    let interval = args
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| router.tick_interval());
    let scheduler = Scheduler::spawn(router.clone(), interval);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut received = 0u64;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                };

                let input = match parse_input_line(&line) {
                    Ok(Some(input)) => input,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed input line");
                        continue;
                    }
                };

                received += 1;
                let outcome = router.notify(input.text, input.options).await;
                if args.json {
                    println!("{}", json_line(&outcome)?);
                } else {
                    println!("{}", format_outcome(&outcome));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    let ticks = scheduler.stop().await;
    let flush = router.shutdown().await;
    info!(received, ticks, queue_size = flush.queue_size, "Run finished");

    if args.json {
        println!("{}", json_line(&flush)?);
    } else if flush.flushed_groups > 0 || flush.drained_batches > 0 || flush.queue_size > 0 {
        println!("{}", format_tick(&flush));
    }
    Ok(())
}
