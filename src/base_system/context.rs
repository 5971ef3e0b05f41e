//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。配置在启动时加载一次，
//! 之后整个运行期间只读。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

/// 判断“已下载”时是否要求画质一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMatch {
    /// (bvid, cid, quality) 三者都一致才算下载过
    #[default]
    Strict,
    /// 同一 (bvid, cid) 任意画质下载过即跳过
    AnyQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 账号
    #[serde(default)]
    pub cookies: String,

    // 路径配置
    #[serde(default = "default_save_path")]
    pub save_path: String,
    #[serde(default = "default_temp_path")]
    pub temp_path: String,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    // 网络配置
    #[serde(default = "default_request_interval")]
    pub request_interval: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout: u64,

    // 下载行为
    #[serde(default)]
    pub history_match: HistoryMatch,
    #[serde(default = "default_true")]
    pub include_collected_folders: bool,
    #[serde(default = "default_true")]
    pub show_progress: bool,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cookies: String::new(),
            save_path: default_save_path(),
            temp_path: default_temp_path(),
            history_file: default_history_file(),
            ffmpeg_path: default_ffmpeg_path(),
            request_interval: default_request_interval(),
            max_retries: default_max_retries(),
            request_timeout: default_request_timeout(),
            stream_timeout: default_stream_timeout(),
            history_match: HistoryMatch::default(),
            include_collected_folders: default_true(),
            show_progress: default_true(),
            base_dir: None,
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 12] = [
            FieldMeta {
                name: "cookies",
                description: "B站 Cookie 字符串（浏览器开发者工具中复制），必须包含 DedeUserID",
            },
            FieldMeta {
                name: "save_path",
                description: "视频保存路径",
            },
            FieldMeta {
                name: "temp_path",
                description: "音视频流临时文件目录",
            },
            FieldMeta {
                name: "history_file",
                description: "下载历史记录文件（JSON，可手动删除条目以重新下载）",
            },
            FieldMeta {
                name: "ffmpeg_path",
                description: "FFmpeg 可执行文件路径（或 PATH 中的命令名）",
            },
            FieldMeta {
                name: "request_interval",
                description: "任意两次网络请求之间的最小间隔（秒），重试间隔同样使用该值",
            },
            FieldMeta {
                name: "max_retries",
                description: "音视频流下载失败后的最大重试次数",
            },
            FieldMeta {
                name: "request_timeout",
                description: "接口请求超时时间（秒）",
            },
            FieldMeta {
                name: "stream_timeout",
                description: "音视频流下载的读取超时（秒）：连接或单次读取超过该时间没有数据即判定本次失败并重试",
            },
            FieldMeta {
                name: "history_match",
                description: "历史记录匹配方式, 可选: [strict, any_quality]\nstrict: 画质不同视为未下载; any_quality: 任意画质下载过即跳过",
            },
            FieldMeta {
                name: "include_collected_folders",
                description: "是否同时列出收藏的他人收藏夹",
            },
            FieldMeta {
                name: "show_progress",
                description: "下载时显示进度条",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.request_interval.is_finite() || self.request_interval <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "request_interval 必须为正数，当前为 {}",
                self.request_interval
            )));
        }
        if self.ffmpeg_path.trim().is_empty() {
            return Err(ConfigError::Validation("ffmpeg_path 不能为空".to_string()));
        }
        if self.save_path.trim().is_empty() {
            return Err(ConfigError::Validation("save_path 不能为空".to_string()));
        }
        Ok(())
    }
}

impl Config {
    /// 相对路径以该目录为基准解析（`--data-dir`）。
    pub fn with_base_dir(mut self, base_dir: Option<&Path>) -> Self {
        self.base_dir = base_dir.map(Path::to_path_buf);
        self
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(raw.trim());
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }

    pub fn save_dir(&self) -> PathBuf {
        self.resolve(&self.save_path)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.resolve(&self.temp_path)
    }

    pub fn history_path(&self) -> PathBuf {
        self.resolve(&self.history_file)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_secs_f64(self.request_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout.max(1))
    }
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            ':' => '：',
            '"' => '＂',
            '<' => '《',
            '>' => '》',
            '/' | '\\' => '、',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            c if (c as u32) < 32 => replacement.chars().next().unwrap_or('_'),
            _ => ch,
        })
        .collect();

    cleaned = cleaned.trim().to_string();
    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let upper = cleaned.to_uppercase();
    if RESERVED.contains(&upper.as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符（如中文）中间截断导致 panic
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
        if cleaned.is_empty() {
            cleaned.push_str("unnamed");
        }
    }

    cleaned
}

fn default_true() -> bool {
    true
}

fn default_save_path() -> String {
    "downloads".to_string()
}

fn default_temp_path() -> String {
    "temp".to_string()
}

fn default_history_file() -> String {
    "download_history.json".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_request_interval() -> f64 {
    1.5
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    10
}

fn default_stream_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::config::load_or_create_with_base;
    use std::fs;

    #[test]
    fn creates_commented_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_or_create_with_base::<Config>(None, Some(dir.path())).unwrap();
        assert!(loaded.created);
        assert_eq!(loaded.path, dir.path().join("config.yml"));

        let text = fs::read_to_string(&loaded.path).unwrap();
        assert!(text.contains("# FFmpeg 可执行文件路径"));
        assert!(text.contains("request_interval: 1.5"));
        assert!(text.contains("history_match: strict"));
    }

    #[test]
    fn merges_partial_file_and_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "cookies: \"DedeUserID=42; SESSDATA=x\"\nmax_retries: 0\n").unwrap();

        let loaded = load_or_create_with_base::<Config>(None, Some(dir.path())).unwrap();
        assert!(!loaded.created);
        let cfg = loaded.config;
        assert_eq!(cfg.cookies, "DedeUserID=42; SESSDATA=x");
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.ffmpeg_path, "ffmpeg");
        assert_eq!(cfg.stream_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.history_match, HistoryMatch::Strict);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("temp_path: temp"));
        assert!(rewritten.contains("max_retries: 0"));
    }

    #[test]
    fn parses_any_quality_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        fs::write(&path, "history_match: any_quality\n").unwrap();
        let loaded = load_or_create_with_base::<Config>(Some(&path), None).unwrap();
        assert_eq!(loaded.config.history_match, HistoryMatch::AnyQuality);
    }

    #[test]
    fn rejects_non_positive_interval() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), "request_interval: 0\n").unwrap();
        let err = load_or_create_with_base::<Config>(None, Some(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_broken_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), "cookies: [unclosed\n").unwrap();
        let err = load_or_create_with_base::<Config>(None, Some(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn relative_paths_follow_base_dir() {
        let base = PathBuf::from("/data");
        let cfg = Config::default().with_base_dir(Some(&base));
        assert_eq!(cfg.save_dir(), base.join("downloads"));
        assert_eq!(cfg.history_path(), base.join("download_history.json"));

        let mut abs = Config::default();
        abs.temp_path = "/tmp/streams".to_string();
        let abs = abs.with_base_dir(Some(&base));
        assert_eq!(abs.temp_dir(), PathBuf::from("/tmp/streams"));
    }

    #[test]
    fn safe_fs_name_replaces_forbidden_chars() {
        assert_eq!(safe_fs_name("a/b:c?", "_", 100), "a、b：c？");
        assert_eq!(safe_fs_name("  ..", "_", 100), "unnamed");
        assert_eq!(safe_fs_name("con", "_", 100), "_con");
        let long = "测".repeat(50);
        let cut = safe_fs_name(&long, "_", 100);
        assert!(cut.len() <= 100);
        assert!(cut.chars().all(|c| c == '测'));
    }
}
