//! 下载相关的数据模型定义。
//!
//! 收藏夹、视频、分P、画质选项等都只在一次运行内存在，由下载流程持有；
//! 需要落盘的只有 `history::DownloadRecord`。

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// 自己创建的收藏夹
    Created,
    /// 收藏的他人收藏夹
    Collected,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub id: u64,
    pub title: String,
    pub entry_count: u64,
    pub kind: CollectionKind,
}

/// 收藏夹列表里的一行，尚未拉取分P信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub video_id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct EntryPage {
    pub medias: Vec<MediaRef>,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct Entry {
    /// BV 号
    pub id: String,
    pub title: String,
    pub parts: Vec<SubPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPart {
    /// 从 1 开始
    pub part_index: u32,
    /// cid
    pub content_id: u64,
    pub title: String,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Audio => "audio",
            StreamKind::Video => "video",
        }
    }
}

/// 一路音频或视频流：主地址加若干备用地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRef {
    pub url: String,
    pub backup_urls: Vec<String>,
    pub bandwidth: u64,
}

impl StreamRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backup_urls: Vec::new(),
            bandwidth: 0,
        }
    }

    /// 第 `attempt` 次尝试（从 0 开始）使用的地址，在主地址和备用地址间轮换。
    pub fn candidate(&self, attempt: u32) -> &str {
        let total = 1 + self.backup_urls.len();
        match attempt as usize % total {
            0 => &self.url,
            i => &self.backup_urls[i - 1],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityOption {
    /// 平台的 qn 编码，越大越清晰
    pub tier_code: u32,
    pub tier_label: String,
    pub audio: StreamRef,
    pub video: StreamRef,
}

/// 画质选择：自动取最高，或指定排序后列表的下标。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualitySelection {
    Automatic,
    Manual(usize),
}

impl QualitySelection {
    /// `options` 已按画质从高到低排序。
    pub fn pick<'a>(&self, options: &'a [QualityOption]) -> Option<&'a QualityOption> {
        match self {
            QualitySelection::Automatic => options.first(),
            QualitySelection::Manual(index) => options.get(*index),
        }
    }
}

pub type QualityAsker = Box<dyn FnMut(&Entry, &SubPart, &[QualityOption]) -> QualitySelection>;

pub enum QualityMode {
    Automatic,
    Manual(QualityAsker),
}

impl QualityMode {
    pub fn select(
        &mut self,
        entry: &Entry,
        part: &SubPart,
        options: &[QualityOption],
    ) -> QualitySelection {
        match self {
            QualityMode::Automatic => QualitySelection::Automatic,
            QualityMode::Manual(ask) => ask(entry, part, options),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u32,
    /// 历史记录中已存在而跳过的分P
    pub skipped: u32,
    pub failed: u32,
    pub entries_failed: u32,
    pub collections_failed: u32,
}

impl RunSummary {
    pub fn merge(&mut self, other: RunSummary) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.entries_failed += other.entries_failed;
        self.collections_failed += other.collections_failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(code: u32) -> QualityOption {
        QualityOption {
            tier_code: code,
            tier_label: format!("{code}"),
            audio: StreamRef::new("a"),
            video: StreamRef::new("v"),
        }
    }

    #[test]
    fn automatic_takes_first() {
        let opts = [option(80), option(64), option(32)];
        assert_eq!(QualitySelection::Automatic.pick(&opts).unwrap().tier_code, 80);
        assert_eq!(QualitySelection::Manual(2).pick(&opts).unwrap().tier_code, 32);
        assert!(QualitySelection::Manual(3).pick(&opts).is_none());
        assert!(QualitySelection::Automatic.pick(&[]).is_none());
    }

    #[test]
    fn candidates_rotate_through_backups() {
        let stream = StreamRef {
            url: "main".to_string(),
            backup_urls: vec!["b1".to_string(), "b2".to_string()],
            bandwidth: 0,
        };
        let seq: Vec<&str> = (0..5).map(|i| stream.candidate(i)).collect();
        assert_eq!(seq, ["main", "b1", "b2", "main", "b1"]);
        assert_eq!(StreamRef::new("only").candidate(3), "only");
    }
}
