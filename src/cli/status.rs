//! 查看类命令: status / test / feedback / history

use anyhow::{bail, Result};
use clap::Args;
use serde_json::json;
use std::path::Path;

use super::load_router;
use super::output::{format_history, format_status, format_test_reports, print_json};
use crate::notification::Feedback;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TestArgs {
    /// 只测试指定渠道
    #[arg(long, short)]
    pub channel: Option<String>,
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct FeedbackArgs {
    /// 投递历史 ID（见 `nhub history`）
    pub id: u64,
    /// positive / negative
    pub feedback: Feedback,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// 显示最近 N 条
    #[arg(long, short, default_value = "20")]
    pub limit: usize,
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 处理 status 命令
pub fn handle_status(args: StatusArgs, config_path: Option<&Path>) -> Result<()> {
    let router = load_router(config_path, false)?;
    let status = router.status();
    if args.json {
        return print_json(&status);
    }
    print!("{}", format_status(&status));
    Ok(())
}

/// 处理 test 命令，任一渠道失败时返回错误（非零退出码）
pub async fn handle_test(args: TestArgs, config_path: Option<&Path>) -> Result<()> {
    let router = load_router(config_path, false)?;
    let reports = router.test_channels(args.channel.as_deref()).await;

    if let Some(name) = &args.channel {
        if reports.is_empty() {
            bail!("Channel not found: {}", name);
        }
    }

    if args.json {
        let items: Vec<_> = reports
            .iter()
            .map(|(name, report)| {
                json!({ "channel": name, "success": report.success, "message": report.message })
            })
            .collect();
        print_json(&items)?;
    } else {
        println!("{}", format_test_reports(&reports));
    }

    let failed = reports.iter().filter(|(_, r)| !r.success).count();
    if failed > 0 {
        bail!("{} channel(s) failed", failed);
    }
    Ok(())
}

/// 处理 feedback 命令
pub fn handle_feedback(args: FeedbackArgs, config_path: Option<&Path>) -> Result<()> {
    let router = load_router(config_path, false)?;
    if !router.record_feedback(args.id, args.feedback)? {
        bail!("History record #{} not found", args.id);
    }
    println!("已记录 #{} 的反馈: {:?}", args.id, args.feedback);
    Ok(())
}

/// 处理 history 命令
pub fn handle_history(args: HistoryArgs, config_path: Option<&Path>) -> Result<()> {
    let router = load_router(config_path, false)?;
    let records = router.history(args.limit);
    if args.json {
        return print_json(&records);
    }
    println!("{}", format_history(&records));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct FeedbackCli {
        #[command(flatten)]
        args: FeedbackArgs,
    }

    #[test]
    fn test_parse_feedback_args() {
        let cli = FeedbackCli::parse_from(["nhub", "12", "negative"]);
        assert_eq!(cli.args.id, 12);
        assert_eq!(cli.args.feedback, Feedback::Negative);

        assert!(FeedbackCli::try_parse_from(["nhub", "12", "meh"]).is_err());
    }

    #[test]
    fn test_feedback_on_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            serde_json::to_string(&json!({
                "channels": {
                    "local_file": {
                        "enabled": true,
                        "adapter": { "type": "local_file", "path": dir.path().join("n.jsonl") }
                    }
                },
                "historyPath": dir.path().join("history.jsonl")
            }))
            .unwrap(),
        )
        .unwrap();

        let err = handle_feedback(
            FeedbackArgs {
                id: 99,
                feedback: Feedback::Positive,
            },
            Some(&config_path),
        )
        .unwrap_err();
        assert!(err.to_string().contains("#99"));
    }
}
