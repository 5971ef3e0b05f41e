//! 登录凭证（Cookie）。
//!
//! Cookie 整体视为不透明字符串原样放进请求头，只解析出 `DedeUserID` 作为用户 ID。

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("cookie 为空，请在配置文件中填写 cookies")]
    Empty,
    #[error("cookie 中缺少 DedeUserID")]
    MissingUserId,
    #[error("DedeUserID 不是数字: {0}")]
    InvalidUserId(String),
}

#[derive(Clone)]
pub struct Credential {
    cookie: String,
    user_id: u64,
}

impl Credential {
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let cookie = raw.trim().trim_end_matches(';').trim().to_string();
        if cookie.is_empty() {
            return Err(CredentialError::Empty);
        }

        let value = cookie_value(&cookie, "DedeUserID").ok_or(CredentialError::MissingUserId)?;
        let user_id = value
            .parse::<u64>()
            .map_err(|_| CredentialError::InvalidUserId(value.to_string()))?;

        Ok(Self { cookie, user_id })
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn cookie_header(&self) -> &str {
        &self.cookie
    }

    /// 没有 SESSDATA 时接口按游客处理，只能拿到低画质。
    pub fn has_session(&self) -> bool {
        cookie_value(&self.cookie, "SESSDATA").is_some_and(|v| !v.is_empty())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("cookie", &"***")
            .finish()
    }
}

fn cookie_value<'a>(cookie: &'a str, name: &str) -> Option<&'a str> {
    cookie.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"'))
    })
}
