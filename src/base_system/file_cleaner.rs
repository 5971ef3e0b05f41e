//! 缓存与临时文件清理。

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

pub fn is_empty_dir(path: impl AsRef<Path>) -> io::Result<bool> {
    let path = path.as_ref();
    let mut entries = fs::read_dir(path)?;
    Ok(entries.next().is_none())
}

/// 尽力删除文件：不存在视为成功，其它失败只记日志。
pub fn remove_file_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "已删除临时文件");
            true
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "删除临时文件失败");
            false
        }
    }
}

/// 目录为空时删除它（运行结束时清理临时目录）。
pub fn remove_dir_if_empty(path: &Path) {
    match is_empty_dir(path) {
        Ok(true) => {
            if let Err(err) = fs::remove_dir(path) {
                debug!(path = %path.display(), error = %err, "删除空目录失败");
            }
        }
        Ok(false) => debug!(path = %path.display(), "临时目录非空，保留"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => debug!(path = %path.display(), error = %err, "读取临时目录失败"),
    }
}
