//! 下载主流程：收藏夹 → 视频 → 分P，严格顺序执行。
//!
//! 每个分P的状态转移：
//! `Pending → QualityResolved → (Skipped | FetchingAudio → FetchingVideo → Muxing → Recording → Done)`，
//! 解析/下载/合并失败进入 `Failed`，记日志后继续下一个；写历史记录失败终止整个运行。

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::error::DownloadError;
use super::fetcher::Fetcher;
use super::history::{DownloadRecord, HistoryStore};
use super::models::{Collection, Entry, QualityMode, RunSummary, StreamKind, SubPart};
use super::muxer::{Muxer, cleanup_sources};
use crate::base_system::context::HistoryMatch;
use crate::base_system::file_cleaner::{remove_dir_if_empty, remove_file_quietly};
use crate::base_system::media_paths::{output_file_path, temp_stream_path};
use crate::base_system::rate_limit::RateLimiter;
use crate::network_parser::catalog::{Catalog, list_entries};
use crate::network_parser::playurl::StreamResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
    Pending,
    QualityResolved(u32),
    Skipped,
    FetchingAudio,
    FetchingVideo,
    Muxing,
    Recording,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartOutcome {
    Done,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub save_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub history_match: HistoryMatch,
}

pub struct Pipeline<'a> {
    catalog: &'a dyn Catalog,
    resolver: &'a dyn StreamResolver,
    fetcher: Fetcher<'a>,
    muxer: &'a dyn Muxer,
    history: &'a mut HistoryStore,
    limiter: &'a RateLimiter,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        resolver: &'a dyn StreamResolver,
        fetcher: Fetcher<'a>,
        muxer: &'a dyn Muxer,
        history: &'a mut HistoryStore,
        limiter: &'a RateLimiter,
        options: PipelineOptions,
    ) -> Self {
        Self {
            catalog,
            resolver,
            fetcher,
            muxer,
            history,
            limiter,
            options,
        }
    }

    /// 依次处理所选收藏夹。只有 `Auth` / `Persist` 会中断并返回 `Err`。
    pub fn run(
        &mut self,
        collections: &[Collection],
        mode: &mut QualityMode,
    ) -> Result<RunSummary, DownloadError> {
        let mut summary = RunSummary::default();
        for collection in collections {
            info!(
                collection = collection.id,
                title = %collection.title,
                count = collection.entry_count,
                "开始处理收藏夹"
            );
            let result = self.run_collection(collection, mode);
            match result {
                Ok(part) => summary.merge(part),
                Err(err) => {
                    remove_dir_if_empty(&self.options.temp_dir);
                    return Err(err);
                }
            }
        }
        remove_dir_if_empty(&self.options.temp_dir);
        info!(
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            "全部收藏夹处理结束"
        );
        Ok(summary)
    }

    fn run_collection(
        &mut self,
        collection: &Collection,
        mode: &mut QualityMode,
    ) -> Result<RunSummary, DownloadError> {
        let mut summary = RunSummary::default();
        let mut entries = list_entries(self.catalog, self.limiter, collection.id);
        loop {
            let Some(item) = entries.next() else {
                break;
            };
            let entry = match item {
                Ok(entry) => entry,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) if entries.aborted() => {
                    error!(
                        collection = collection.id,
                        error = %err,
                        "获取收藏夹内容失败，跳过该收藏夹剩余部分"
                    );
                    summary.collections_failed += 1;
                    break;
                }
                Err(err) => {
                    warn!(collection = collection.id, error = %err, "获取视频信息失败，跳过");
                    summary.entries_failed += 1;
                    continue;
                }
            };

            if entry.parts.is_empty() {
                warn!(bvid = %entry.id, title = %entry.title, "视频没有可下载的分P，跳过");
                summary.entries_failed += 1;
                continue;
            }
            summary.merge(self.run_entry(&entry, mode)?);
        }
        Ok(summary)
    }

    fn run_entry(
        &mut self,
        entry: &Entry,
        mode: &mut QualityMode,
    ) -> Result<RunSummary, DownloadError> {
        let mut summary = RunSummary::default();
        info!(bvid = %entry.id, title = %entry.title, parts = entry.parts.len(), "处理视频");
        for part in &entry.parts {
            match self.run_part(entry, part, mode) {
                Ok(PartOutcome::Done) => summary.completed += 1,
                Ok(PartOutcome::Skipped) => summary.skipped += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!(
                        bvid = %entry.id,
                        part = part.part_index,
                        cid = part.content_id,
                        error = %err,
                        "分P处理失败"
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    fn run_part(
        &mut self,
        entry: &Entry,
        part: &SubPart,
        mode: &mut QualityMode,
    ) -> Result<PartOutcome, DownloadError> {
        transition(entry, part, PartState::Pending);

        if self.options.history_match == HistoryMatch::AnyQuality
            && self.history.is_done_any_quality(&entry.id, part.content_id)
        {
            transition(entry, part, PartState::Skipped);
            info!(bvid = %entry.id, part = part.part_index, "已下载过（任意画质），跳过");
            return Ok(PartOutcome::Skipped);
        }

        let options = self
            .resolver
            .resolve(self.limiter, &entry.id, part.content_id)?;
        if options.is_empty() {
            return Err(DownloadError::UnavailableStream {
                video_id: entry.id.clone(),
                content_id: part.content_id,
                reason: "没有可选画质".to_string(),
            });
        }
        let selection = mode.select(entry, part, &options);
        let chosen = match selection.pick(&options) {
            Some(option) => option,
            None => {
                warn!(
                    bvid = %entry.id,
                    part = part.part_index,
                    ?selection,
                    "所选画质不存在，改用最高画质"
                );
                &options[0]
            }
        };
        transition(entry, part, PartState::QualityResolved(chosen.tier_code));

        if self
            .history
            .is_done(&entry.id, part.content_id, chosen.tier_code)
        {
            transition(entry, part, PartState::Skipped);
            info!(
                bvid = %entry.id,
                part = part.part_index,
                quality = %chosen.tier_label,
                "已下载过，跳过"
            );
            return Ok(PartOutcome::Skipped);
        }

        let temp_dir = &self.options.temp_dir;
        let audio_path = temp_stream_path(temp_dir, &entry.id, part.content_id, StreamKind::Audio);
        let video_path = temp_stream_path(temp_dir, &entry.id, part.content_id, StreamKind::Video);
        let output = output_file_path(&self.options.save_dir, entry, part);
        info!(
            bvid = %entry.id,
            part = part.part_index,
            quality = %chosen.tier_label,
            output = %output.display(),
            "开始下载"
        );

        transition(entry, part, PartState::FetchingAudio);
        self.fetcher.fetch(&chosen.audio, &audio_path)?;

        transition(entry, part, PartState::FetchingVideo);
        if let Err(err) = self.fetcher.fetch(&chosen.video, &video_path) {
            remove_file_quietly(&audio_path);
            return Err(err);
        }

        transition(entry, part, PartState::Muxing);
        let muxed = self.muxer.mux(&audio_path, &video_path, &output);
        cleanup_sources(&audio_path, &video_path);
        if let Err(err) = muxed {
            discard_partial_output(&output);
            return Err(err.into());
        }

        transition(entry, part, PartState::Recording);
        self.history.record(DownloadRecord::new(
            &entry.id,
            part.content_id,
            chosen.tier_code,
            &entry.title,
        ))?;

        transition(entry, part, PartState::Done);
        info!(bvid = %entry.id, part = part.part_index, "下载完成");
        Ok(PartOutcome::Done)
    }
}

fn transition(entry: &Entry, part: &SubPart, state: PartState) {
    debug!(bvid = %entry.id, part = part.part_index, cid = part.content_id, ?state, "分P状态");
}

fn discard_partial_output(output: &Path) {
    if output.exists() {
        remove_file_quietly(output);
    }
}
