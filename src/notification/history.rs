//! 投递历史 - 固定容量环形缓冲区
//!
//! 每次实际发送都会追加一条记录；反馈（positive/negative）由外部信号稍后附加，
//! 用于渠道偏好学习。满了之后覆盖最旧的记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 用户反馈
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Positive,
    Negative,
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "pos" | "+" | "up" | "good" => Ok(Feedback::Positive),
            "negative" | "neg" | "-" | "down" | "bad" => Ok(Feedback::Negative),
            other => Err(format!("unknown feedback: {} (expected positive/negative)", other)),
        }
    }
}

/// 历史记录（JSONL 格式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: u64,
    pub ts: DateTime<Utc>,
    pub text: String,
    /// 实际发送到的渠道
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

/// 环形缓冲区
#[derive(Debug, Clone)]
pub struct HistoryLog {
    slots: Vec<Option<HistoryRecord>>,
    /// 下一个写入位置
    head: usize,
    len: usize,
    next_id: u64,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
            next_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 追加新记录，返回分配的 id
    pub fn push(&mut self, ts: DateTime<Utc>, text: impl Into<String>, channels: Vec<String>) -> u64 {
        let id = self.next_id;
        self.insert(HistoryRecord {
            id,
            ts,
            text: text.into(),
            channels,
            feedback: None,
        });
        id
    }

    /// 恢复已持久化的记录（保留原 id）
    pub fn restore(&mut self, records: impl IntoIterator<Item = HistoryRecord>) {
        for record in records {
            self.insert(record);
        }
    }

    fn insert(&mut self, record: HistoryRecord) {
        self.next_id = self.next_id.max(record.id + 1);

        self.slots[self.head] = Some(record);
        self.head = (self.head + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    /// 从最旧到最新遍历
    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> + '_ {
        let capacity = self.slots.len();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len).filter_map(move |i| self.slots[(start + i) % capacity].as_ref())
    }

    pub fn get(&self, id: u64) -> Option<&HistoryRecord> {
        self.iter().find(|r| r.id == id)
    }

    /// 附加反馈，返回原来的反馈；记录已被覆盖或不存在时返回 None
    pub fn set_feedback(&mut self, id: u64, feedback: Feedback) -> Option<Option<Feedback>> {
        let slot = self
            .slots
            .iter_mut()
            .flatten()
            .find(|r| r.id == id)?;
        Some(slot.feedback.replace(feedback))
    }

    /// 带反馈的记录数
    pub fn feedback_count(&self) -> usize {
        self.iter().filter(|r| r.feedback.is_some()).count()
    }

    /// 最近 N 条（最旧在前）
    pub fn recent(&self, n: usize) -> Vec<&HistoryRecord> {
        let skip = self.len.saturating_sub(n);
        self.iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(log: &mut HistoryLog, text: &str) -> u64 {
        log.push(Utc::now(), text, vec!["slack".to_string()])
    }

    #[test]
    fn test_push_assigns_increasing_ids() {
        let mut log = HistoryLog::new(4);
        let a = push(&mut log, "a");
        let b = push(&mut log, "b");
        assert!(b > a);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut log = HistoryLog::new(3);
        for text in ["a", "b", "c", "d", "e"] {
            push(&mut log, text);
        }
        let texts: Vec<&str> = log.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["c", "d", "e"]);
        assert_eq!(log.len(), 3);
        assert_eq!(log.capacity(), 3);
    }

    #[test]
    fn test_set_feedback() {
        let mut log = HistoryLog::new(2);
        let first = push(&mut log, "a");
        let second = push(&mut log, "b");

        assert_eq!(log.set_feedback(second, Feedback::Positive), Some(None));
        assert_eq!(log.get(second).unwrap().feedback, Some(Feedback::Positive));
        assert_eq!(
            log.set_feedback(second, Feedback::Negative),
            Some(Some(Feedback::Positive))
        );
        assert_eq!(log.feedback_count(), 1);

        // 被覆盖的记录无法再附加反馈
        push(&mut log, "c");
        assert!(log.set_feedback(first, Feedback::Negative).is_none());
    }

    #[test]
    fn test_restore_keeps_ids() {
        let mut log = HistoryLog::new(10);
        log.restore(vec![
            HistoryRecord {
                id: 41,
                ts: Utc::now(),
                text: "old".to_string(),
                channels: vec![],
                feedback: Some(Feedback::Negative),
            },
            HistoryRecord {
                id: 42,
                ts: Utc::now(),
                text: "older".to_string(),
                channels: vec![],
                feedback: None,
            },
        ]);
        assert_eq!(push(&mut log, "new"), 43);
        assert_eq!(log.feedback_count(), 1);
    }

    #[test]
    fn test_recent() {
        let mut log = HistoryLog::new(5);
        for text in ["a", "b", "c"] {
            push(&mut log, text);
        }
        let recent: Vec<&str> = log.recent(2).iter().map(|r| r.text.as_str()).collect();
        assert_eq!(recent, vec!["b", "c"]);
    }

    #[test]
    fn test_feedback_parse() {
        assert_eq!("positive".parse::<Feedback>(), Ok(Feedback::Positive));
        assert_eq!("BAD".parse::<Feedback>(), Ok(Feedback::Negative));
        assert!("meh".parse::<Feedback>().is_err());
    }
}
