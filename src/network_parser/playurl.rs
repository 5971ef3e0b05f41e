//! 播放地址解析：把 DASH 返回整理成按画质排序的选项列表。

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::network::BiliClient;
use crate::base_system::json_extract::{JsonMap, array_or_empty, pick_string, pick_u64};
use crate::base_system::rate_limit::RateLimiter;
use crate::download::error::DownloadError;
use crate::download::models::{QualityOption, StreamRef};

/// fnval=16 请求 DASH 格式
const FNVAL_DASH: u32 = 16;

pub trait StreamResolver {
    /// 返回的选项按画质从高到低排序，且不为空。
    fn resolve(
        &self,
        limiter: &RateLimiter,
        video_id: &str,
        content_id: u64,
    ) -> Result<Vec<QualityOption>, DownloadError>;
}

impl StreamResolver for BiliClient {
    fn resolve(
        &self,
        limiter: &RateLimiter,
        video_id: &str,
        content_id: u64,
    ) -> Result<Vec<QualityOption>, DownloadError> {
        let data = self
            .get_data(
                limiter,
                "/x/player/playurl",
                &[
                    ("bvid", video_id.to_string()),
                    ("cid", content_id.to_string()),
                    ("fnval", FNVAL_DASH.to_string()),
                    ("fourk", "1".to_string()),
                ],
                "获取播放地址",
            )
            .map_err(|err| match err {
                DownloadError::Api { code, message, .. } => DownloadError::UnavailableStream {
                    video_id: video_id.to_string(),
                    content_id,
                    reason: format!("接口返回 {code}: {message}"),
                },
                other => other,
            })?;

        let options = parse_dash_qualities(&data);
        if options.is_empty() {
            return Err(DownloadError::UnavailableStream {
                video_id: video_id.to_string(),
                content_id,
                reason: "没有可播放的 DASH 画质".to_string(),
            });
        }
        debug!(
            bvid = video_id,
            cid = content_id,
            tiers = ?options.iter().map(|o| o.tier_code).collect::<Vec<_>>(),
            "可用画质"
        );
        Ok(options)
    }
}

/// 每个画质取带宽最高的视频流；音频取全局带宽最高的一路，所有画质共用。
pub(crate) fn parse_dash_qualities(data: &Value) -> Vec<QualityOption> {
    let Some(map) = data.as_object() else {
        return Vec::new();
    };
    let Some(dash) = map.get("dash").and_then(Value::as_object) else {
        return Vec::new();
    };

    let Some(audio) = array_or_empty(dash, "audio")
        .iter()
        .filter_map(Value::as_object)
        .filter_map(stream_from_row)
        .max_by_key(|(_, s)| s.bandwidth)
        .map(|(_, s)| s)
    else {
        return Vec::new();
    };

    let mut best_video: BTreeMap<u32, StreamRef> = BTreeMap::new();
    for (code, stream) in array_or_empty(dash, "video")
        .iter()
        .filter_map(Value::as_object)
        .filter_map(stream_from_row)
    {
        match best_video.get(&code) {
            Some(current) if current.bandwidth >= stream.bandwidth => {}
            _ => {
                best_video.insert(code, stream);
            }
        }
    }

    let labels = accept_labels(map);
    best_video
        .into_iter()
        .rev()
        .map(|(code, video)| QualityOption {
            tier_code: code,
            tier_label: labels
                .get(&code)
                .cloned()
                .unwrap_or_else(|| format!("qn {code}")),
            audio: audio.clone(),
            video,
        })
        .collect()
}

fn stream_from_row(row: &JsonMap) -> Option<(u32, StreamRef)> {
    let code = pick_u64(row, &["id"])? as u32;
    let url = pick_string(row, &["base_url", "baseUrl"])?;
    let backup_urls = row
        .get("backup_url")
        .or_else(|| row.get("backupUrl"))
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some((
        code,
        StreamRef {
            url,
            backup_urls,
            bandwidth: pick_u64(row, &["bandwidth"]).unwrap_or(0),
        },
    ))
}

/// `accept_quality` 与 `accept_description` 按位置对应；描述里 `xxx:` 前缀去掉。
fn accept_labels(map: &JsonMap) -> BTreeMap<u32, String> {
    let codes = array_or_empty(map, "accept_quality");
    let descriptions = array_or_empty(map, "accept_description");
    codes
        .iter()
        .zip(descriptions)
        .filter_map(|(code, desc)| {
            let code = code.as_u64()? as u32;
            let desc = desc.as_str()?;
            let label = match desc.split_once(':') {
                Some((_, rest)) => rest.trim(),
                None => desc.trim(),
            };
            Some((code, label.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "accept_quality": [116, 80, 64, 32],
            "accept_description": ["高清 1080P60", "高清 1080P", "大会员:高清 720P", "清晰 480P"],
            "dash": {
                "video": [
                    {"id": 80, "bandwidth": 1_000, "base_url": "v80-low", "backup_url": ["v80-low-b"]},
                    {"id": 80, "bandwidth": 3_000, "baseUrl": "v80-high", "backupUrl": ["v80-high-b1", "v80-high-b2"]},
                    {"id": 64, "bandwidth": 800, "base_url": "v64"},
                    {"id": 32, "bandwidth": 300, "base_url": "v32", "backup_url": null}
                ],
                "audio": [
                    {"id": 30216, "bandwidth": 67_000, "base_url": "a-low"},
                    {"id": 30280, "bandwidth": 320_000, "base_url": "a-high", "backup_url": ["a-high-b"]}
                ]
            }
        })
    }

    #[test]
    fn tiers_sorted_best_first_with_best_streams() {
        let options = parse_dash_qualities(&sample());
        let codes: Vec<u32> = options.iter().map(|o| o.tier_code).collect();
        // 116 在 accept 列表里但没有对应视频流
        assert_eq!(codes, [80, 64, 32]);

        let best = &options[0];
        assert_eq!(best.tier_label, "高清 1080P");
        assert_eq!(best.video.url, "v80-high");
        assert_eq!(best.video.backup_urls, ["v80-high-b1", "v80-high-b2"]);
        assert_eq!(best.video.bandwidth, 3_000);
        assert_eq!(options[1].tier_label, "高清 720P");
        assert!(options[2].video.backup_urls.is_empty());
    }

    #[test]
    fn highest_audio_is_shared() {
        let options = parse_dash_qualities(&sample());
        assert!(options.iter().all(|o| o.audio.url == "a-high"));
        assert_eq!(options[0].audio.backup_urls, ["a-high-b"]);
    }

    #[test]
    fn missing_dash_or_audio_yields_nothing() {
        assert!(parse_dash_qualities(&Value::Null).is_empty());
        assert!(parse_dash_qualities(&json!({"durl": []})).is_empty());
        assert!(
            parse_dash_qualities(&json!({
                "dash": {"video": [{"id": 80, "bandwidth": 1, "base_url": "v"}], "audio": null}
            }))
            .is_empty()
        );
    }

    #[test]
    fn unknown_label_falls_back_to_code() {
        let options = parse_dash_qualities(&json!({
            "dash": {
                "video": [{"id": 127, "bandwidth": 1, "base_url": "v"}],
                "audio": [{"id": 1, "bandwidth": 1, "base_url": "a"}]
            }
        }));
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].tier_label, "qn 127");
    }
}
