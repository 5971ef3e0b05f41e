//! 下载流程的错误分类。
//!
//! - 运行级（终止整个运行）：`Auth`、`Persist`
//! - 收藏夹级：翻页失败时跳过该收藏夹
//! - 视频/分P级：记录日志后继续下一个

use thiserror::Error;

use super::fetcher::FetchAttemptError;
use super::history::HistoryError;
use super::muxer::MuxError;
use crate::base_system::credential::CredentialError;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("登录凭证无效: {0}")]
    Auth(String),

    #[error("{context} 网络请求失败: {message}")]
    TransientNetwork { context: String, message: String },

    #[error("{context} 接口返回错误 {code}: {message}")]
    Api {
        context: String,
        code: i64,
        message: String,
    },

    #[error("{video_id} (cid {content_id}) 没有可用的视频流: {reason}")]
    UnavailableStream {
        video_id: String,
        content_id: u64,
        reason: String,
    },

    #[error("下载 {url} 失败，已尝试 {attempts} 次: {source}")]
    Fetch {
        url: String,
        attempts: u32,
        #[source]
        source: FetchAttemptError,
    },

    #[error("合并音视频失败: {0}")]
    Mux(#[from] MuxError),

    #[error("保存下载记录失败: {0}")]
    Persist(#[from] HistoryError),
}

impl DownloadError {
    /// 需要终止整个运行的错误。
    pub fn is_fatal(&self) -> bool {
        matches!(self, DownloadError::Auth(_) | DownloadError::Persist(_))
    }

    pub(crate) fn network(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        DownloadError::TransientNetwork {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

impl From<CredentialError> for DownloadError {
    fn from(err: CredentialError) -> Self {
        DownloadError::Auth(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn only_auth_and_persist_are_fatal() {
        assert!(DownloadError::from(CredentialError::MissingUserId).is_fatal());
        let persist = HistoryError::Write {
            path: PathBuf::from("h.json"),
            source: std::io::Error::other("disk full"),
        };
        assert!(DownloadError::from(persist).is_fatal());

        assert!(!DownloadError::network("获取收藏夹", "timeout").is_fatal());
        assert!(
            !DownloadError::UnavailableStream {
                video_id: "BV1".into(),
                content_id: 1,
                reason: "地区限制".into(),
            }
            .is_fatal()
        );
        assert!(!DownloadError::Mux(MuxError::OutputMissing { path: PathBuf::from("o.mp4") }).is_fatal());
    }
}
