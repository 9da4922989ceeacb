//! 周期调度器 - 定时驱动 `tick`（刷新聚合窗口、排空队列）
//!
//! `stop()` 只阻止后续 tick，不会取消正在进行的发送。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::router::NotificationRouter;

/// 正在运行的调度器
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<u64>,
}

impl SchedulerHandle {
    /// 停止调度并等待当前 tick 结束，返回执行过的 tick 数
    pub async fn stop(self) -> u64 {
        let _ = self.stop_tx.send(true);
        match self.join.await {
            Ok(ticks) => ticks,
            Err(e) => {
                warn!(error = %e, "Scheduler task ended abnormally");
                0
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

pub struct Scheduler;

impl Scheduler {
    /// 在后台启动调度循环
    pub fn spawn(router: Arc<NotificationRouter>, interval: Duration) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let period = interval.max(Duration::from_millis(10));

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即完成，跳过
            ticker.tick().await;

            info!(interval_ms = period.as_millis() as u64, "Scheduler started");
            let mut ticks = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = router.tick().await;
                        ticks += 1;
                        if report.flushed_groups > 0 || report.drained_batches > 0 {
                            debug!(
                                flushed_groups = report.flushed_groups,
                                drained_batches = report.drained_batches,
                                queue_size = report.queue_size,
                                "Scheduler tick"
                            );
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(ticks, "Scheduler stopped");
            ticks
        });

        SchedulerHandle { stop_tx, join }
    }
}
