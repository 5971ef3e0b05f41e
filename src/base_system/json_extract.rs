//! 宽松的 JSON 取值工具：B站接口里同一字段有时是数字有时是字符串，
//! 也可能是 null，这里统一兜底。

use serde_json::Value;

pub type JsonMap = serde_json::Map<String, Value>;

pub fn pick_string(map: &JsonMap, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(val) = map.get(*key) {
            if let Some(s) = val.as_str() {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            } else if let Some(n) = val.as_i64() {
                return Some(n.to_string());
            } else if let Some(n) = val.as_u64() {
                return Some(n.to_string());
            }
        }
    }
    None
}

pub fn pick_u64(map: &JsonMap, keys: &[&str]) -> Option<u64> {
    for key in keys {
        if let Some(val) = map.get(*key) {
            if let Some(n) = val.as_u64() {
                return Some(n);
            }
            if let Some(s) = val.as_str()
                && let Ok(n) = s.trim().parse::<u64>()
            {
                return Some(n);
            }
        }
    }
    None
}

pub fn pick_bool(map: &JsonMap, keys: &[&str]) -> Option<bool> {
    for key in keys {
        if let Some(val) = map.get(*key) {
            if let Some(b) = val.as_bool() {
                return Some(b);
            }
            if let Some(n) = val.as_i64() {
                return Some(n != 0);
            }
        }
    }
    None
}

/// 取数组字段；缺失或为 null 时返回空切片（空收藏夹的 `medias` 就是 null）。
pub fn array_or_empty<'a>(map: &'a JsonMap, key: &str) -> &'a [Value] {
    map.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
