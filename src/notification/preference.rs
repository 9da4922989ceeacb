//! 渠道偏好评分 - 基于历史反馈的启发式重排
//!
//! 不是模型，只是频率统计：
//! - 带反馈的历史记录达到 `min_samples` 后，在与当前通知相似的记录中统计每个渠道的
//!   `(正反馈 - 负反馈) / 总数`，按分数降序排列；同分时按累计偏好分，再按输入顺序
//! - 夜间（默认 22:00-07:00）静默渠道（如 email）排到最前
//! - 每次反馈对相关渠道的偏好分做一次 `±learning_rate` 的调整，限制在 [0, 1]
//!
//! 给定相同的历史和输入，结果总是相同的。

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;

use super::dnd::ClockRange;
use super::history::{Feedback, HistoryLog, HistoryRecord};
use super::message::Notification;
use super::similarity::text_similarity;
use crate::config::PreferenceConfig;
use crate::error::Result;

const INITIAL_SCORE: f64 = 0.5;

/// 单个渠道的偏好
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelPreference {
    pub channel: String,
    pub score: f64,
    pub sample_count: u32,
}

impl ChannelPreference {
    fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            score: INITIAL_SCORE,
            sample_count: 0,
        }
    }
}

/// 偏好评分器
#[derive(Debug, Clone)]
pub struct PreferenceScorer {
    min_samples: usize,
    learning_rate: f64,
    similarity_threshold: f64,
    silent_channels: Vec<String>,
    night_hours: ClockRange,
    max_channels: Option<usize>,
    preferences: BTreeMap<String, ChannelPreference>,
}

impl PreferenceScorer {
    pub fn from_config(config: &PreferenceConfig) -> Result<Self> {
        let (start, end) = config.night_hours.parse()?;
        Ok(Self {
            min_samples: config.min_samples,
            learning_rate: config.learning_rate,
            similarity_threshold: config.similarity_threshold,
            silent_channels: config.silent_channels.clone(),
            night_hours: ClockRange::new(start, end),
            max_channels: config.max_channels,
            preferences: BTreeMap::new(),
        })
    }

    /// 根据一条反馈调整记录中所有渠道的偏好
    pub fn learn(&mut self, record: &HistoryRecord, feedback: Feedback) {
        let delta = match feedback {
            Feedback::Positive => self.learning_rate,
            Feedback::Negative => -self.learning_rate,
        };

        for channel in &record.channels {
            let pref = self
                .preferences
                .entry(channel.clone())
                .or_insert_with(|| ChannelPreference::new(channel));
            pref.score = (pref.score + delta).clamp(0.0, 1.0);
            pref.sample_count += 1;
        }
    }

    /// 用已加载的历史重建偏好（启动时调用）
    pub fn rebuild(&mut self, history: &HistoryLog) {
        self.preferences.clear();
        for record in history.iter() {
            if let Some(feedback) = record.feedback {
                self.learn(record, feedback);
            }
        }
    }

    pub fn preference(&self, channel: &str) -> f64 {
        self.preferences
            .get(channel)
            .map(|p| p.score)
            .unwrap_or(INITIAL_SCORE)
    }

    pub fn preferences(&self) -> Vec<ChannelPreference> {
        self.preferences.values().cloned().collect()
    }

    /// 对候选渠道重新排序
    pub fn rank(
        &self,
        channels: &[String],
        notification: &Notification,
        history: &HistoryLog,
        now: DateTime<Local>,
    ) -> Vec<String> {
        let mut ranked: Vec<String> = channels.to_vec();

        if history.feedback_count() >= self.min_samples && self.min_samples > 0 {
            let scores = self.history_scores(channels, notification, history);
            // sort_by 是稳定排序，同分保留输入顺序
            ranked.sort_by(|a, b| {
                let sa = scores.get(a.as_str()).copied().unwrap_or(0.0);
                let sb = scores.get(b.as_str()).copied().unwrap_or(0.0);
                sb.total_cmp(&sa)
                    .then_with(|| self.preference(b).total_cmp(&self.preference(a)))
            });
        }

        if self.is_night(now) {
            let (silent, loud): (Vec<String>, Vec<String>) = ranked
                .into_iter()
                .partition(|c| self.silent_channels.contains(c));
            ranked = silent.into_iter().chain(loud).collect();
        }

        if let Some(max) = self.max_channels {
            ranked.truncate(max.max(1));
        }

        ranked
    }

    pub fn is_night(&self, now: DateTime<Local>) -> bool {
        self.night_hours.contains(now.time())
    }

    /// 在相似的历史记录里统计每个渠道的 (正 - 负) / 总数
    fn history_scores<'a>(
        &self,
        channels: &'a [String],
        notification: &Notification,
        history: &HistoryLog,
    ) -> BTreeMap<&'a str, f64> {
        let similar: Vec<&HistoryRecord> = history
            .iter()
            .filter(|r| r.feedback.is_some())
            .filter(|r| text_similarity(&r.text, &notification.text) >= self.similarity_threshold)
            .collect();

        let mut scores = BTreeMap::new();
        for channel in channels {
            let mut positive = 0i64;
            let mut negative = 0i64;
            for record in similar.iter().filter(|r| r.channels.contains(channel)) {
                match record.feedback {
                    Some(Feedback::Positive) => positive += 1,
                    Some(Feedback::Negative) => negative += 1,
                    None => {}
                }
            }
            let total = positive + negative;
            if total > 0 {
                scores.insert(channel.as_str(), (positive - negative) as f64 / total as f64);
            }
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn scorer(min_samples: usize) -> PreferenceScorer {
        PreferenceScorer::from_config(&PreferenceConfig {
            min_samples,
            ..Default::default()
        })
        .unwrap()
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn history_with(entries: &[(&str, &[&str], Feedback)]) -> HistoryLog {
        let mut log = HistoryLog::new(50);
        for (text, channels, feedback) in entries {
            let id = log.push(Utc::now(), *text, names(channels));
            log.set_feedback(id, *feedback);
        }
        log
    }

    #[test]
    fn test_default_order_without_enough_samples() {
        let s = scorer(5);
        let history = history_with(&[("build failed", &["email"], Feedback::Positive)]);
        let n = Notification::new("build failed", noon());
        let input = names(&["slack", "telegram", "email"]);
        assert_eq!(s.rank(&input, &n, &history, noon()), input);
    }

    #[test]
    fn test_ranks_by_similar_feedback() {
        let s = scorer(3);
        let history = history_with(&[
            ("build 1 failed on main", &["telegram"], Feedback::Positive),
            ("build 2 failed on main", &["telegram", "slack"], Feedback::Positive),
            ("build 3 failed on main", &["slack"], Feedback::Negative),
            // 不相似的记录不计入
            ("lunch is ready", &["slack"], Feedback::Positive),
        ]);
        let n = Notification::new("build 4 failed on main", noon());
        let ranked = s.rank(&names(&["slack", "email", "telegram"]), &n, &history, noon());
        // telegram: 1.0, email: 无数据 0.0, slack: (1-1)/2 = 0.0 -> 与 email 同分，保持输入顺序
        assert_eq!(ranked, names(&["telegram", "slack", "email"]));
    }

    #[test]
    fn test_night_moves_silent_channels_first() {
        let s = scorer(5);
        let n = Notification::new("nightly job done", noon());
        let night = Local.with_ymd_and_hms(2026, 1, 15, 23, 30, 0).unwrap();
        let input = names(&["telegram", "email", "slack"]);

        assert_eq!(
            s.rank(&input, &n, &HistoryLog::new(10), night),
            names(&["email", "telegram", "slack"])
        );
        assert_eq!(s.rank(&input, &n, &HistoryLog::new(10), noon()), input);
    }

    #[test]
    fn test_learn_nudges_and_clamps() {
        let mut s = scorer(5);
        let record = HistoryRecord {
            id: 1,
            ts: Utc::now(),
            text: "x".to_string(),
            channels: names(&["slack"]),
            feedback: None,
        };

        s.learn(&record, Feedback::Positive);
        assert!((s.preference("slack") - 0.6).abs() < 1e-9);

        for _ in 0..10 {
            s.learn(&record, Feedback::Positive);
        }
        assert_eq!(s.preference("slack"), 1.0);

        for _ in 0..20 {
            s.learn(&record, Feedback::Negative);
        }
        assert_eq!(s.preference("slack"), 0.0);
        assert_eq!(s.preferences()[0].sample_count, 31);
        assert_eq!(s.preference("unknown"), 0.5);
    }

    #[test]
    fn test_rebuild_from_history() {
        let mut s = scorer(5);
        let history = history_with(&[
            ("a", &["slack"], Feedback::Positive),
            ("b", &["slack"], Feedback::Positive),
        ]);
        s.rebuild(&history);
        assert!((s.preference("slack") - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_max_channels_truncates() {
        let s = PreferenceScorer::from_config(&PreferenceConfig {
            max_channels: Some(2),
            ..Default::default()
        })
        .unwrap();
        let n = Notification::new("x", noon());
        let ranked = s.rank(&names(&["a", "b", "c"]), &n, &HistoryLog::new(1), noon());
        assert_eq!(ranked, names(&["a", "b"]));
    }

    #[test]
    fn test_rank_is_deterministic() {
        let s = scorer(1);
        let history = history_with(&[
            ("disk full on host", &["slack"], Feedback::Negative),
            ("disk full on host again", &["email"], Feedback::Positive),
        ]);
        let n = Notification::new("disk full on host", noon());
        let input = names(&["slack", "email", "telegram"]);
        let first = s.rank(&input, &n, &history, noon());
        for _ in 0..10 {
            assert_eq!(s.rank(&input, &n, &history, noon()), first);
        }
        assert_eq!(first, names(&["email", "telegram", "slack"]));
    }
}
