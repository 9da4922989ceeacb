//! Notify Hub CLI
//!
//! 把开发工具产生的通知按规则路由到 webhook / telegram / openclaw / 本地文件等渠道

use anyhow::Result;
use clap::{Parser, Subcommand};
use notify_hub::cli::{
    handle_feedback, handle_history, handle_run, handle_send, handle_status, handle_test,
    FeedbackArgs, HistoryArgs, RunArgs, SendArgs, StatusArgs, TestArgs,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "nhub")]
#[command(about = "Notify Hub - 通知路由、限流、聚合与多渠道投递")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/notify-hub/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送一条通知
    Send(SendArgs),
    /// 常驻运行，从 stdin 读取通知
    Run(RunArgs),
    /// 查看渠道、限流与偏好状态
    Status(StatusArgs),
    /// 向渠道发送测试消息
    Test(TestArgs),
    /// 对一条投递历史记录反馈
    Feedback(FeedbackArgs),
    /// 查看投递历史
    History(HistoryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // 日志输出到 stderr，stdout 留给命令结果（JSON 输出需要干净的 stdout）
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notify_hub=info,nhub=info"));
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Send(args) => handle_send(args, config).await,
        Commands::Run(args) => handle_run(args, config).await,
        Commands::Status(args) => handle_status(args, config),
        Commands::Test(args) => handle_test(args, config).await,
        Commands::Feedback(args) => handle_feedback(args, config),
        Commands::History(args) => handle_history(args, config),
    }
}
