//! B站 Web 接口的 HTTP 客户端。
//!
//! 所有请求都带上 Cookie / Referer / User-Agent，并在发出前经过共享的 `RateLimiter`。
//! 接口统一返回 `{code, message, data}`，这里只把 `code == 0` 的 `data` 交给上层。

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CONNECTION, COOKIE, HeaderMap, HeaderValue, REFERER, USER_AGENT,
};
use serde_json::Value;
use tracing::debug;

use crate::base_system::context::Config;
use crate::base_system::credential::Credential;
use crate::base_system::rate_limit::RateLimiter;
use crate::download::error::DownloadError;
use crate::download::fetcher::{ByteSource, FetchAttemptError, StreamBody};

pub(crate) const API_BASE: &str = "https://api.bilibili.com";
const REFERER_URL: &str = "https://www.bilibili.com";
const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36";

/// 未登录
const CODE_NOT_LOGGED_IN: i64 = -101;

#[derive(Debug, Clone)]
pub struct BiliWebConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// 视频流的单次读取超时；不限制整个下载的总时长
    pub stream_timeout: Duration,
    pub user_agent: String,
    /// 列收藏夹时是否包含收藏的他人收藏夹
    pub include_collected: bool,
}

impl Default for BiliWebConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_UA.to_string(),
            include_collected: true,
        }
    }
}

impl From<&Config> for BiliWebConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            request_timeout: cfg.request_timeout(),
            stream_timeout: cfg.stream_timeout(),
            include_collected: cfg.include_collected_folders,
            ..Self::default()
        }
    }
}

pub struct BiliClient {
    api: Client,
    stream: Client,
    credential: Credential,
    include_collected: bool,
}

impl BiliClient {
    pub fn new(credential: Credential, config: BiliWebConfig) -> anyhow::Result<Self> {
        let headers = default_headers(&credential, &config.user_agent)?;

        let api = Client::builder()
            .default_headers(headers.clone())
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        // 阻塞客户端的 timeout 作用于发送和每次读取，CDN 中途停止发送时本次尝试会失败
        let stream = Client::builder()
            .default_headers(headers)
            .timeout(config.stream_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            api,
            stream,
            credential,
            include_collected: config.include_collected,
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn include_collected(&self) -> bool {
        self.include_collected
    }

    /// GET 一个接口并返回 `data` 字段。
    pub(crate) fn get_data(
        &self,
        limiter: &RateLimiter,
        path: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<Value, DownloadError> {
        let url = format!("{API_BASE}{path}");
        limiter.wait_if_needed();
        debug!(url, ?query, "请求接口");

        let resp = self
            .api
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| DownloadError::network(context, e))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| DownloadError::network(context, e))?;
        let body: Value = resp.json().map_err(|e| DownloadError::network(context, e))?;

        unwrap_envelope(body, context)
    }
}

/// 拆开 `{code, message, data}`。
pub(crate) fn unwrap_envelope(body: Value, context: &str) -> Result<Value, DownloadError> {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
    if code == 0 {
        return Ok(body.get("data").cloned().unwrap_or(Value::Null));
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    if code == CODE_NOT_LOGGED_IN {
        return Err(DownloadError::Auth(format!("{context}: {message}")));
    }
    Err(DownloadError::Api {
        context: context.to_string(),
        code,
        message,
    })
}

impl ByteSource for BiliClient {
    fn open(&self, url: &str) -> Result<StreamBody, FetchAttemptError> {
        let resp = self
            .stream
            .get(url)
            .send()
            .map_err(|e| FetchAttemptError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchAttemptError::Status(status.as_u16()));
        }
        let content_length = resp.content_length();
        Ok(StreamBody {
            reader: Box::new(resp),
            content_length,
        })
    }
}

fn default_headers(credential: &Credential, user_agent: &str) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    // reqwest 未启用 gzip，要求原样传输
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(REFERER, HeaderValue::from_static(REFERER_URL));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent).unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
    );
    let mut cookie = HeaderValue::from_str(credential.cookie_header())
        .map_err(|_| anyhow::anyhow!("cookie 中包含非法字符"))?;
    cookie.set_sensitive(true);
    headers.insert(COOKIE, cookie);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_success_returns_data() {
        let data = unwrap_envelope(json!({"code": 0, "message": "0", "data": {"a": 1}}), "t").unwrap();
        assert_eq!(data["a"], 1);
        let empty = unwrap_envelope(json!({"code": 0}), "t").unwrap();
        assert!(empty.is_null());
    }

    #[test]
    fn envelope_not_logged_in_is_auth_error() {
        let err = unwrap_envelope(json!({"code": -101, "message": "账号未登录"}), "获取收藏夹").unwrap_err();
        assert!(matches!(err, DownloadError::Auth(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn envelope_other_codes_are_api_errors() {
        let err = unwrap_envelope(json!({"code": -404, "message": "啥都木有"}), "视频信息").unwrap_err();
        match err {
            DownloadError::Api { code, message, .. } => {
                assert_eq!(code, -404);
                assert_eq!(message, "啥都木有");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn stalled_stream_fails_each_attempt_instead_of_hanging() {
        use crate::download::fetcher::Fetcher;
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::thread;
        use std::time::Instant;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming().take(2) {
                let Ok(mut stream) = stream else { continue };
                thread::spawn(move || {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf);
                    let _ = stream.write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n0123456789",
                    );
                    let _ = stream.flush();
                    thread::sleep(Duration::from_secs(5));
                });
            }
        });

        let cred = Credential::parse("DedeUserID=1; SESSDATA=abc").unwrap();
        let client = BiliClient::new(
            cred,
            BiliWebConfig {
                stream_timeout: Duration::from_millis(300),
                ..BiliWebConfig::default()
            },
        )
        .unwrap();
        let limiter = RateLimiter::new(Duration::ZERO);
        let fetcher = Fetcher::new(&client, &limiter, 1, false);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("BV1_1_video.m4s");

        let start = Instant::now();
        let err = fetcher
            .fetch(
                &crate::download::models::StreamRef::new(format!("http://{addr}/v.m4s")),
                &dest,
            )
            .unwrap_err();
        assert!(matches!(err, DownloadError::Fetch { attempts: 2, .. }), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(!dest.exists());
    }

    #[test]
    fn client_builds_with_cookie_headers() {
        let cred = Credential::parse("DedeUserID=1; SESSDATA=abc").unwrap();
        let client = BiliClient::new(cred, BiliWebConfig::default()).unwrap();
        assert_eq!(client.credential().user_id(), 1);
    }
}
