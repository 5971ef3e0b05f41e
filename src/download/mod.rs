//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（收藏夹 / 视频 / 分P / 画质选项 / 运行汇总）
//! - `error`：下载流程的错误分类
//! - `fetcher`：单路流下载与重试
//! - `progress`：字节进度条
//! - `muxer`：FFmpeg 合并
//! - `history`：下载历史记录
//! - `pipeline`：下载主流程编排

pub mod error;
pub mod fetcher;
pub mod history;
pub mod models;
pub mod muxer;
pub mod pipeline;
pub(crate) mod progress;
