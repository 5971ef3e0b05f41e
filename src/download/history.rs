//! 下载历史记录。
//!
//! 文件是一个 JSON 数组，每条 `{bvid, cid, quality, title, timestamp}`，
//! 与旧版脚本的格式兼容，可以直接手工编辑（删掉某条即会重新下载）。
//! 启动时整体读入内存，每次新增记录后整体重写：先写同目录临时文件，再 rename 覆盖。
//! 读入时有无法解析的条目，会先把原文件复制为 `<name>.corrupt-<时间戳>`。

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    #[serde(rename = "bvid")]
    pub video_id: String,
    #[serde(rename = "cid")]
    pub content_id: u64,
    #[serde(rename = "quality")]
    pub quality_tier: u32,
    #[serde(default)]
    pub title: String,
    /// Unix 秒
    #[serde(rename = "timestamp", default)]
    pub completed_at: i64,
}

impl DownloadRecord {
    pub fn new(video_id: &str, content_id: u64, quality_tier: u32, title: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            content_id,
            quality_tier,
            title: title.to_string(),
            completed_at: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    fn key(&self) -> RecordKey {
        (self.video_id.clone(), self.content_id, self.quality_tier)
    }
}

type RecordKey = (String, u64, u32);

pub struct HistoryStore {
    path: PathBuf,
    records: Vec<DownloadRecord>,
    keys: HashSet<RecordKey>,
    parts: HashSet<(String, u64)>,
}

impl HistoryStore {
    /// 读取历史文件；不存在时创建空数组文件。
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let mut store = Self {
            path: path.to_path_buf(),
            records: Vec::new(),
            keys: HashSet::new(),
            parts: HashSet::new(),
        };

        if !path.exists() {
            store.persist()?;
            return Ok(store);
        }

        let raw = fs::read_to_string(path).map_err(|source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(store);
        }

        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) | Err(_) => {
                let moved = store.quarantine_corrupt()?;
                error!(
                    backup = %moved.display(),
                    "历史记录文件损坏，已备份并重置"
                );
                store.persist()?;
                return Ok(store);
            }
        };

        let mut skipped = 0usize;
        for (idx, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<DownloadRecord>(item) {
                Ok(record) => {
                    store.insert(record);
                }
                Err(err) => {
                    skipped += 1;
                    warn!(index = idx, error = %err, "忽略无法解析的历史记录条目");
                }
            }
        }
        // 下次写入会整体重写文件，无法解析的条目会丢失，先留一份原文件
        if skipped > 0 {
            let backup = store.backup_path();
            fs::copy(path, &backup).map_err(|source| HistoryError::Io {
                path: backup.clone(),
                source,
            })?;
            warn!(
                skipped,
                backup = %backup.display(),
                "部分历史记录条目无法解析，下次保存时会被移除，原文件已备份"
            );
        }

        info!(count = store.len(), path = %path.display(), "已加载历史记录");
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_done(&self, video_id: &str, content_id: u64, quality_tier: u32) -> bool {
        self.keys
            .contains(&(video_id.to_string(), content_id, quality_tier))
    }

    /// 只看 (bvid, cid)，不管画质。
    pub fn is_done_any_quality(&self, video_id: &str, content_id: u64) -> bool {
        self.parts.contains(&(video_id.to_string(), content_id))
    }

    /// 追加记录并立即落盘；键已存在时不做任何事，返回 `false`。
    pub fn record(&mut self, record: DownloadRecord) -> Result<bool, HistoryError> {
        let key = record.key();
        if self.keys.contains(&key) {
            return Ok(false);
        }
        self.insert(record);
        if let Err(err) = self.persist() {
            self.rollback_last();
            return Err(err);
        }
        Ok(true)
    }

    fn insert(&mut self, record: DownloadRecord) -> bool {
        if !self.keys.insert(record.key()) {
            return false;
        }
        self.parts
            .insert((record.video_id.clone(), record.content_id));
        self.records.push(record);
        true
    }

    fn rollback_last(&mut self) {
        let Some(record) = self.records.pop() else {
            return;
        };
        self.keys.remove(&record.key());
        let still_has_part = self
            .records
            .iter()
            .any(|r| r.video_id == record.video_id && r.content_id == record.content_id);
        if !still_has_part {
            self.parts
                .remove(&(record.video_id.clone(), record.content_id));
        }
    }

    fn persist(&self) -> Result<(), HistoryError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let write_err = |source: io::Error| HistoryError::Write {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(&dir).map_err(write_err)?;
        let json = serde_json::to_string_pretty(&self.records)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let stamp = OffsetDateTime::now_utc().unix_timestamp();
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download_history.json".to_string());
        self.path.with_file_name(format!("{file_name}.corrupt-{stamp}"))
    }

    fn quarantine_corrupt(&self) -> Result<PathBuf, HistoryError> {
        let backup = self.backup_path();
        fs::rename(&self.path, &backup).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(backup)
    }
}
