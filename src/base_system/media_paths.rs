use std::path::{Path, PathBuf};

use crate::base_system::context::safe_fs_name;
use crate::download::models::{Entry, StreamKind, SubPart};

/// 整个文件名的字节上限，留出余量低于常见文件系统的 255 字节
const NAME_MAX_BYTES: usize = 200;
/// 多P文件名需要截断时，分P名至少保留的字节数
const PART_TITLE_MIN_BYTES: usize = 30;
const ID_MAX_BYTES: usize = 64;
const EXTENSION: &str = ".mp4";

/// 成品文件名：单P为 `标题 [BV号].mp4`，多P为 `标题 [BV号] P02 分P名.mp4`。
///
/// 超长时先截分P名，再截视频标题；`[BV号]`、`Pnn` 和扩展名始终保留。
pub fn output_file_name(entry: &Entry, part: &SubPart) -> String {
    let id = safe_fs_name(&entry.id, "_", ID_MAX_BYTES);
    if entry.parts.len() <= 1 {
        let suffix = format!(" [{id}]{EXTENSION}");
        let title = safe_fs_name(&entry.title, "_", NAME_MAX_BYTES - suffix.len());
        return format!("{title}{suffix}");
    }

    let marker = format!(" [{id}] P{:02} ", part.part_index);
    let budget = NAME_MAX_BYTES - marker.len() - EXTENSION.len();
    let mut title = safe_fs_name(&entry.title, "_", usize::MAX);
    let mut part_title = safe_fs_name(&part.title, "_", usize::MAX);

    if title.len() + part_title.len() > budget {
        let room = budget
            .saturating_sub(title.len())
            .max(PART_TITLE_MIN_BYTES);
        part_title = safe_fs_name(&part_title, "_", room);
    }
    if title.len() + part_title.len() > budget {
        title = safe_fs_name(&title, "_", budget - part_title.len());
    }
    format!("{title}{marker}{part_title}{EXTENSION}")
}

pub fn output_file_path(save_dir: &Path, entry: &Entry, part: &SubPart) -> PathBuf {
    save_dir.join(output_file_name(entry, part))
}

pub fn temp_stream_path(temp_dir: &Path, video_id: &str, content_id: u64, kind: StreamKind) -> PathBuf {
    let video_id = safe_fs_name(video_id, "_", 64);
    temp_dir.join(format!("{}_{}_{}.m4s", video_id, content_id, kind.as_str()))
}
