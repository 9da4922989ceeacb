//! JSONL 文件存储 - 投递历史和本地通知日志共用
//!
//! 追加写时持有 fs2 独占锁；每写入若干次检查一次行数，超过上限时
//! 只保留最近的记录（写临时文件后原子替换）。

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

const CLEANUP_CHECK_INTERVAL: usize = 10;

/// JSONL 文件
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    /// 超过该行数时清理
    max_records: usize,
    /// 清理后保留的行数
    keep_after_cleanup: usize,
    write_count: AtomicUsize,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>, max_records: usize) -> Self {
        let max_records = max_records.max(1);
        Self {
            path: path.into(),
            max_records,
            keep_after_cleanup: (max_records / 2).max(1),
            write_count: AtomicUsize::new(0),
        }
    }

    /// 清理后保留的行数（默认为上限的一半）
    pub fn with_keep_after_cleanup(mut self, keep: usize) -> Self {
        self.keep_after_cleanup = keep.clamp(1, self.max_records);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录（带文件锁）
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;
        let written = writeln!(file, "{}", serde_json::to_string(record)?);
        file.unlock()?;
        written?;

        self.maybe_cleanup();
        Ok(())
    }

    /// 读取最近 N 条记录（跳过无法解析的行）
    pub fn read_recent<T: DeserializeOwned>(&self, n: usize) -> Vec<T> {
        let mut records: Vec<T> = self.read_all();
        let start = records.len().saturating_sub(n);
        records.drain(..start);
        records
    }

    /// 读取全部记录
    pub fn read_all<T: DeserializeOwned>(&self) -> Vec<T> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect()
    }

    /// 用给定记录整体替换文件内容
    pub fn rewrite<'a, T, I>(&self, records: I) -> Result<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let lines = records
            .into_iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.replace_lines(&lines)
    }

    /// 定期检查并清理
    fn maybe_cleanup(&self) {
        let count = self.write_count.fetch_add(1, Ordering::Relaxed);
        if count % CLEANUP_CHECK_INTERVAL != 0 {
            return;
        }

        if let Err(e) = self.cleanup() {
            warn!(path = %self.path.display(), error = %e, "Failed to compact JSONL file");
        }
    }

    /// 行数超过上限时只保留最近的记录
    fn cleanup(&self) -> Result<()> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Ok(()),
        };
        let lines: Vec<String> = BufReader::new(file).lines().map_while(|l| l.ok()).collect();

        if lines.len() <= self.max_records {
            return Ok(());
        }

        let start = lines.len().saturating_sub(self.keep_after_cleanup);
        self.replace_lines(&lines[start..])
    }

    fn replace_lines(&self, lines: &[String]) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        lock_file.lock_exclusive()?;

        let temp_path = self.path.with_extension("tmp");
        let result = (|| -> Result<()> {
            let mut temp_file = File::create(&temp_path)?;
            for line in lines {
                writeln!(temp_file, "{}", line)?;
            }
            temp_file.sync_all()?;
            // 原子替换
            fs::rename(&temp_path, &self.path)?;
            Ok(())
        })();

        lock_file.unlock()?;
        result
    }
}
