//! 收藏夹目录：列出收藏夹，按页遍历收藏夹内的视频，并展开分P。

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, info};

use super::network::BiliClient;
use crate::base_system::json_extract::{JsonMap, array_or_empty, pick_bool, pick_string, pick_u64};
use crate::base_system::rate_limit::RateLimiter;
use crate::download::error::DownloadError;
use crate::download::models::{Collection, CollectionKind, Entry, EntryPage, MediaRef, SubPart};

pub(crate) const PAGE_SIZE: u32 = 20;

/// 收藏夹内资源类型：2 = 视频稿件（12 为音频等，不处理）
const MEDIA_TYPE_VIDEO: u64 = 2;
/// `attr` 为 9 表示稿件已失效（UP 主删除）
const MEDIA_ATTR_DELETED: u64 = 9;

pub trait Catalog {
    fn list_collections(&self, limiter: &RateLimiter) -> Result<Vec<Collection>, DownloadError>;

    /// 第 `page` 页（从 1 开始）。
    fn entry_page(
        &self,
        limiter: &RateLimiter,
        collection_id: u64,
        page: u32,
    ) -> Result<EntryPage, DownloadError>;

    fn video_detail(&self, limiter: &RateLimiter, video_id: &str) -> Result<Entry, DownloadError>;
}

/// 惰性遍历一个收藏夹里的视频：缓冲用完才请求下一页，每一项再展开分P。
///
/// 翻页失败时产出该错误并结束；单个视频取详情失败只产出该项错误，后续继续。
pub struct Entries<'a> {
    catalog: &'a dyn Catalog,
    limiter: &'a RateLimiter,
    collection_id: u64,
    next_page: u32,
    buffer: VecDeque<MediaRef>,
    exhausted: bool,
    aborted: bool,
}

pub fn list_entries<'a>(
    catalog: &'a dyn Catalog,
    limiter: &'a RateLimiter,
    collection_id: u64,
) -> Entries<'a> {
    Entries {
        catalog,
        limiter,
        collection_id,
        next_page: 1,
        buffer: VecDeque::new(),
        exhausted: false,
        aborted: false,
    }
}

impl Entries<'_> {
    /// 是否因翻页失败提前结束。
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    fn fill(&mut self) -> Result<(), DownloadError> {
        while self.buffer.is_empty() && !self.exhausted {
            let page = self
                .catalog
                .entry_page(self.limiter, self.collection_id, self.next_page)?;
            debug!(
                collection = self.collection_id,
                page = self.next_page,
                count = page.medias.len(),
                "已获取收藏夹分页"
            );
            self.next_page += 1;
            self.exhausted = !page.has_more;
            self.buffer.extend(page.medias);
        }
        Ok(())
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<Entry, DownloadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.aborted {
            return None;
        }
        if let Err(err) = self.fill() {
            self.aborted = true;
            self.exhausted = true;
            self.buffer.clear();
            return Some(Err(err));
        }
        let media = self.buffer.pop_front()?;
        debug!(bvid = %media.video_id, title = %media.title, "获取视频分P信息");
        Some(self.catalog.video_detail(self.limiter, &media.video_id))
    }
}

impl Catalog for BiliClient {
    fn list_collections(&self, limiter: &RateLimiter) -> Result<Vec<Collection>, DownloadError> {
        self.list_folders(limiter, self.include_collected())
    }

    fn entry_page(
        &self,
        limiter: &RateLimiter,
        collection_id: u64,
        page: u32,
    ) -> Result<EntryPage, DownloadError> {
        let data = self.get_data(
            limiter,
            "/x/v3/fav/resource/list",
            &[
                ("media_id", collection_id.to_string()),
                ("pn", page.to_string()),
                ("ps", PAGE_SIZE.to_string()),
                ("platform", "web".to_string()),
            ],
            "获取收藏夹内容",
        )?;
        Ok(parse_entry_page(&data))
    }

    fn video_detail(&self, limiter: &RateLimiter, video_id: &str) -> Result<Entry, DownloadError> {
        let data = self.get_data(
            limiter,
            "/x/web-interface/view",
            &[("bvid", video_id.to_string())],
            "获取视频信息",
        )?;
        parse_video_detail(&data, video_id)
    }
}

impl BiliClient {
    /// 自己创建的收藏夹；`include_collected` 时再追加收藏的他人收藏夹。
    pub fn list_folders(
        &self,
        limiter: &RateLimiter,
        include_collected: bool,
    ) -> Result<Vec<Collection>, DownloadError> {
        let up_mid = self.credential().user_id().to_string();
        let mut folders = self.folder_pages(
            limiter,
            "/x/v3/fav/folder/created/list",
            &up_mid,
            CollectionKind::Created,
        )?;
        if include_collected {
            folders.extend(self.folder_pages(
                limiter,
                "/x/v3/fav/folder/collected/list",
                &up_mid,
                CollectionKind::Collected,
            )?);
        }
        info!(count = folders.len(), "已获取收藏夹列表");
        Ok(folders)
    }

    fn folder_pages(
        &self,
        limiter: &RateLimiter,
        path: &str,
        up_mid: &str,
        kind: CollectionKind,
    ) -> Result<Vec<Collection>, DownloadError> {
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let data = self.get_data(
                limiter,
                path,
                &[
                    ("up_mid", up_mid.to_string()),
                    ("pn", page.to_string()),
                    ("ps", PAGE_SIZE.to_string()),
                    ("platform", "web".to_string()),
                ],
                "获取收藏夹列表",
            )?;
            let (folders, has_more) = parse_folder_page(&data, kind);
            out.extend(folders);
            if !has_more {
                break;
            }
            page += 1;
        }
        Ok(out)
    }
}

pub(crate) fn parse_folder_page(data: &Value, kind: CollectionKind) -> (Vec<Collection>, bool) {
    let Some(map) = data.as_object() else {
        return (Vec::new(), false);
    };
    let rows = array_or_empty(map, "list");
    let folders: Vec<Collection> = rows
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|row| {
            Some(Collection {
                id: pick_u64(row, &["id"])?,
                title: pick_string(row, &["title"]).unwrap_or_default(),
                entry_count: pick_u64(row, &["media_count"]).unwrap_or(0),
                kind,
            })
        })
        .collect();
    let has_more = pick_bool(map, &["has_more"]).unwrap_or(rows.len() >= PAGE_SIZE as usize);
    (folders, has_more && !rows.is_empty())
}

pub(crate) fn parse_entry_page(data: &Value) -> EntryPage {
    let Some(map) = data.as_object() else {
        return EntryPage {
            medias: Vec::new(),
            has_more: false,
        };
    };
    let rows = array_or_empty(map, "medias");
    let medias = rows
        .iter()
        .filter_map(Value::as_object)
        .filter_map(media_from_row)
        .collect();
    let has_more = pick_bool(map, &["has_more"]).unwrap_or(rows.len() >= PAGE_SIZE as usize);
    EntryPage {
        medias,
        has_more: has_more && !rows.is_empty(),
    }
}

fn media_from_row(row: &JsonMap) -> Option<MediaRef> {
    let title = pick_string(row, &["title"]).unwrap_or_default();
    let Some(video_id) = pick_string(row, &["bvid", "bv_id"]) else {
        debug!(title = %title, "跳过没有 BV 号的收藏项");
        return None;
    };
    let media_type = pick_u64(row, &["type"]).unwrap_or(MEDIA_TYPE_VIDEO);
    if media_type != MEDIA_TYPE_VIDEO {
        info!(bvid = %video_id, media_type, "跳过非视频收藏项");
        return None;
    }
    if pick_u64(row, &["attr"]) == Some(MEDIA_ATTR_DELETED) {
        info!(bvid = %video_id, title = %title, "跳过已失效视频");
        return None;
    }
    Some(MediaRef {
        video_id,
        title,
    })
}

pub(crate) fn parse_video_detail(data: &Value, video_id: &str) -> Result<Entry, DownloadError> {
    let map = data.as_object().ok_or_else(|| DownloadError::Api {
        context: "获取视频信息".to_string(),
        code: 0,
        message: format!("{video_id} 返回的 data 为空"),
    })?;

    let title = pick_string(map, &["title"]).unwrap_or_else(|| video_id.to_string());
    let parts: Vec<SubPart> = array_or_empty(map, "pages")
        .iter()
        .filter_map(Value::as_object)
        .enumerate()
        .filter_map(|(idx, page)| {
            Some(SubPart {
                part_index: pick_u64(page, &["page"]).unwrap_or(idx as u64 + 1) as u32,
                content_id: pick_u64(page, &["cid"])?,
                title: pick_string(page, &["part"]).unwrap_or_else(|| format!("P{}", idx + 1)),
                duration_secs: pick_u64(page, &["duration"]).unwrap_or(0),
            })
        })
        .collect();

    Ok(Entry {
        id: pick_string(map, &["bvid"]).unwrap_or_else(|| video_id.to_string()),
        title,
        parts,
    })
}
