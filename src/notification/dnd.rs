//! 免打扰（DND）- 按时间表决定是否丢弃通知
//!
//! 纯函数：结果只取决于 (notification, schedule, now)。
//! - 优先级在 exceptions 中：永不抑制
//! - 当前时间落在 sleep_hours：抑制（支持跨午夜，如 23:00-07:00）
//! - auto_detect 且处于 work_hours：只放行与工作相关的通知

use chrono::{DateTime, Local, NaiveTime, Timelike};

use super::message::Notification;
use super::priority::Priority;
use crate::config::DndConfig;
use crate::error::Result;

/// 时钟区间 `[start, end)`；`start > end` 时跨午夜
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ClockRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// 判断时间是否在区间内（分钟精度）
    pub fn contains(&self, time: NaiveTime) -> bool {
        let t = truncate_to_minute(time);
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

/// 解析后的免打扰时间表
#[derive(Debug, Clone, PartialEq)]
pub struct DndSchedule {
    pub enabled: bool,
    pub work_hours: Option<ClockRange>,
    pub sleep_hours: Option<ClockRange>,
    pub exceptions: Vec<Priority>,
    pub auto_detect: bool,
    /// 小写
    pub work_keywords: Vec<String>,
}

impl DndSchedule {
    pub fn from_config(config: &DndConfig) -> Result<Self> {
        let parse = |range: &Option<crate::config::TimeRange>| -> Result<Option<ClockRange>> {
            match range {
                Some(r) => {
                    let (start, end) = r.parse()?;
                    Ok(Some(ClockRange::new(start, end)))
                }
                None => Ok(None),
            }
        };

        Ok(Self {
            enabled: config.enabled,
            work_hours: parse(&config.schedule.work_hours)?,
            sleep_hours: parse(&config.schedule.sleep_hours)?,
            exceptions: config.exceptions.clone(),
            auto_detect: config.auto_detect,
            work_keywords: config
                .work_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        })
    }

    /// 关闭状态的时间表
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            work_hours: None,
            sleep_hours: None,
            exceptions: Vec::new(),
            auto_detect: false,
            work_keywords: Vec::new(),
        }
    }
}

/// 是否应该抑制此通知
pub fn should_suppress(notification: &Notification, schedule: &DndSchedule, now: DateTime<Local>) -> bool {
    if !schedule.enabled {
        return false;
    }

    if let Some(priority) = notification.priority {
        if schedule.exceptions.contains(&priority) {
            return false;
        }
    }

    let time = now.time();

    if let Some(sleep) = schedule.sleep_hours {
        if sleep.contains(time) {
            return true;
        }
    }

    if schedule.auto_detect {
        if let Some(work) = schedule.work_hours {
            if work.contains(time) && !is_work_related(notification, &schedule.work_keywords) {
                return true;
            }
        }
    }

    false
}

/// 文本或关键词中包含任一工作关键词
fn is_work_related(notification: &Notification, work_keywords: &[String]) -> bool {
    let text = notification.text.to_lowercase();
    work_keywords.iter().any(|k| {
        text.contains(k.as_str()) || notification.keywords.iter().any(|nk| nk.contains(k.as_str()))
    })
}
