//! CLI 输出格式化（人类可读 / JSON）

use anyhow::Result;
use serde::Serialize;

use crate::notification::channel::{ChannelTestReport, SendResult};
use crate::notification::dispatcher::DeliveryResult;
use crate::notification::history::HistoryRecord;
use crate::notification::router::{NotifyOutcome, RouterStatus, TickReport};

/// 打印格式化的 JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// 单行 JSON（`run` 模式逐条输出）
pub fn json_line<T: Serialize>(data: &T) -> Result<String> {
    Ok(serde_json::to_string(data)?)
}

/// 投递结果的人类可读描述
pub fn format_delivery(result: &DeliveryResult) -> String {
    let mut out = format!(
        "成功 {} / 失败 {} / 共 {}",
        result.successful, result.failed, result.total
    );
    if !result.queued.is_empty() {
        out.push_str(&format!("，限流排队: {}", result.queued.join(", ")));
    }
    if let Some(id) = result.history_id {
        out.push_str(&format!("  (history #{})", id));
    }
    if let Some(error) = &result.error {
        out.push_str(&format!("\n  ✗ {}", error));
    }
    for outcome in &result.outcomes {
        let line = match &outcome.result {
            Err(error) => format!("✗ {}: {}", outcome.channel, error),
            Ok(SendResult::Failed(reason)) => format!("✗ {}: {}", outcome.channel, reason),
            Ok(SendResult::Skipped(reason)) => format!("- {} (skipped: {})", outcome.channel, reason),
            Ok(SendResult::Sent) => format!("✓ {}", outcome.channel),
        };
        out.push_str("\n  ");
        out.push_str(&line);
    }
    out
}

pub fn format_outcome(outcome: &NotifyOutcome) -> String {
    match outcome {
        NotifyOutcome::Delivered(result) => format!("已发送: {}", format_delivery(result)),
        NotifyOutcome::Suppressed => "已被免打扰规则抑制".to_string(),
        NotifyOutcome::Aggregated => "已加入聚合分组，稍后以摘要发送".to_string(),
    }
}

pub fn format_tick(report: &TickReport) -> String {
    let mut out = format!(
        "刷新聚合分组 {} 个，队列发送 {} 批，剩余排队 {}",
        report.flushed_groups, report.drained_batches, report.queue_size
    );
    for delivery in &report.deliveries {
        out.push_str(&format!("\n{}", format_delivery(delivery)));
    }
    out
}

pub fn format_status(status: &RouterStatus) -> String {
    let mut out = String::from("渠道:\n");
    for (name, channel) in &status.channels {
        let state = if channel.enabled { "启用" } else { "停用" };
        out.push_str(&format!(
            "  {} [{}] {}",
            name,
            channel.channel_type.as_deref().unwrap_or("-"),
            state
        ));
        if let Some(limit) = channel.rate_limit {
            out.push_str(&format!("  限流 {}/{}ms", limit.max, limit.window_ms));
        }
        if let Some(window) = status.rate_limits.get(&format!("channel:{}", name)) {
            out.push_str(&format!("  当前 {}", window.count));
        }
        out.push('\n');
    }
    out.push_str(&format!("队列: {}\n", status.queue_size));
    out.push_str(&format!("聚合分组: {}\n", status.pending_groups.len()));
    out.push_str(&format!("投递历史: {} 条\n", status.history_size));
    if !status.preferences.is_empty() {
        out.push_str("渠道偏好:\n");
        for pref in &status.preferences {
            out.push_str(&format!(
                "  {} {:.2} ({} 次反馈)\n",
                pref.channel, pref.score, pref.sample_count
            ));
        }
    }
    if status.dnd_active {
        out.push_str("免打扰: 生效中\n");
    }
    if status.dry_run {
        out.push_str("[DRY-RUN]\n");
    }
    out
}

pub fn format_history(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "暂无投递历史".to_string();
    }
    records
        .iter()
        .map(|r| {
            let feedback = r
                .feedback
                .map(|f| format!(" [{:?}]", f).to_lowercase())
                .unwrap_or_default();
            format!(
                "#{} {} → {}{}\n    {}",
                r.id,
                r.ts.format("%Y-%m-%d %H:%M:%S"),
                r.channels.join(", "),
                feedback,
                r.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_test_reports(reports: &[(String, ChannelTestReport)]) -> String {
    if reports.is_empty() {
        return "没有可测试的渠道".to_string();
    }
    reports
        .iter()
        .map(|(name, report)| {
            let mark = if report.success { "✓" } else { "✗" };
            format!("{} {}: {}", mark, name, report.message)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::notification::dispatcher::DeliveryOutcome;

    #[test]
    fn test_format_delivery_lists_channels() {
        let mut result = DeliveryResult::from_outcomes(
            vec![
                DeliveryOutcome {
                    channel: "slack".to_string(),
                    result: Ok(SendResult::Sent),
                },
                DeliveryOutcome {
                    channel: "email".to_string(),
                    result: Err(DeliveryError::AdapterSendFailed {
                        channel: "email".to_string(),
                        message: "timeout".to_string(),
                    }),
                },
            ],
            vec!["telegram".to_string()],
        );
        result.history_id = Some(7);

        let text = format_delivery(&result);
        assert!(text.starts_with("成功 1 / 失败 1 / 共 2"));
        assert!(text.contains("限流排队: telegram"));
        assert!(text.contains("history #7"));
        assert!(text.contains("✓ slack"));
        assert!(text.contains("✗ email: Send to email failed: timeout"));
    }

    #[test]
    fn test_format_outcome_variants() {
        assert!(format_outcome(&NotifyOutcome::Suppressed).contains("免打扰"));
        assert!(format_outcome(&NotifyOutcome::Aggregated).contains("聚合"));
    }

    #[test]
    fn test_json_line_is_single_line() {
        let line = json_line(&NotifyOutcome::Suppressed).unwrap();
        assert_eq!(line, r#"{"outcome":"suppressed"}"#);
    }
}
