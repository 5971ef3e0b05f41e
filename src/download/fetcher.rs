//! 单路音频/视频流的下载与重试。
//!
//! 重试策略是固定间隔：每次尝试前都经过共享的 [`RateLimiter`]，
//! 所以相邻两次尝试至少间隔 `request_interval`，不做指数退避。

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use super::error::DownloadError;
use super::models::StreamRef;
use super::progress::TransferProgress;
use crate::base_system::file_cleaner::remove_file_quietly;
use crate::base_system::rate_limit::RateLimiter;

/// 单次下载尝试失败的原因。
#[derive(Debug, Error)]
pub enum FetchAttemptError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("incomplete body: expected {expected} bytes, got {actual}")]
    Incomplete { expected: u64, actual: u64 },
}

pub struct StreamBody {
    pub reader: Box<dyn Read>,
    pub content_length: Option<u64>,
}

/// 字节来源：正式运行时是带 Cookie/Referer 的 HTTP 客户端。
pub trait ByteSource {
    fn open(&self, url: &str) -> Result<StreamBody, FetchAttemptError>;
}

pub struct Fetcher<'a> {
    source: &'a dyn ByteSource,
    limiter: &'a RateLimiter,
    max_retries: u32,
    show_progress: bool,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        source: &'a dyn ByteSource,
        limiter: &'a RateLimiter,
        max_retries: u32,
        show_progress: bool,
    ) -> Self {
        Self {
            source,
            limiter,
            max_retries,
            show_progress,
        }
    }

    /// 下载到 `destination`，返回写入字节数。共尝试 `max_retries + 1` 次，
    /// 每次失败都会先删掉残留文件。
    pub fn fetch(&self, stream: &StreamRef, destination: &Path) -> Result<u64, DownloadError> {
        let attempts = self.max_retries.saturating_add(1);
        let label = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut attempt = 0u32;
        loop {
            let url = stream.candidate(attempt);
            attempt += 1;
            self.limiter.wait_if_needed();
            debug!(attempt, attempts, url, "开始下载流");

            match self.try_once(url, destination, &label) {
                Ok(bytes) => return Ok(bytes),
                Err(err) => {
                    remove_file_quietly(destination);
                    if attempt >= attempts {
                        return Err(DownloadError::Fetch {
                            url: stream.url.clone(),
                            attempts,
                            source: err,
                        });
                    }
                    warn!(
                        file = %label,
                        error = %err,
                        "下载失败（重试 {}/{}）",
                        attempt,
                        self.max_retries
                    );
                }
            }
        }
    }

    fn try_once(&self, url: &str, destination: &Path, label: &str) -> Result<u64, FetchAttemptError> {
        let body = self.source.open(url)?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(destination)?);

        let progress = TransferProgress::new(self.show_progress, label, body.content_length);
        let mut reader = progress.wrap(body.reader);
        let written = io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        progress.finish();

        if let Some(expected) = body.content_length
            && written != expected
        {
            return Err(FetchAttemptError::Incomplete {
                expected,
                actual: written,
            });
        }
        Ok(written)
    }
}
