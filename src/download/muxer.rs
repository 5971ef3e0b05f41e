//! 调用 FFmpeg 合并音视频流（只做 `-c copy` 封装，不转码）。

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::base_system::cmd;
use crate::base_system::file_cleaner::remove_file_quietly;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("external tool is missing: {program}")]
    ToolMissing { program: String },
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} exited with code {code:?}: {stderr}")]
    ToolFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("muxer reported success but {path} was not created")]
    OutputMissing { path: PathBuf },
}

pub trait Muxer {
    fn mux(&self, audio: &Path, video: &Path, output: &Path) -> Result<(), MuxError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    program: String,
}

impl FfmpegMuxer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Muxer for FfmpegMuxer {
    fn mux(&self, audio: &Path, video: &Path, output: &Path) -> Result<(), MuxError> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|source| MuxError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        }

        debug!(program = %self.program, output = %output.display(), "开始合并音视频");
        let result = cmd::command(&self.program)
            .args(["-nostdin", "-y", "-loglevel", "error"])
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-c", "copy"])
            .arg(output)
            .output()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => MuxError::ToolMissing {
                    program: self.program.clone(),
                },
                _ => MuxError::Spawn {
                    program: self.program.clone(),
                    source,
                },
            })?;

        if !result.status.success() {
            return Err(MuxError::ToolFailed {
                program: self.program.clone(),
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !output.is_file() {
            return Err(MuxError::OutputMissing {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// 合并结束后删除两个临时流文件，失败只记日志。
pub fn cleanup_sources(audio: &Path, video: &Path) {
    remove_file_quietly(audio);
    remove_file_quietly(video);
}
