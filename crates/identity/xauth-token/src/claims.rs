use crate::error::{TokenError, TokenResult};
use serde::{Deserialize, Serialize};

/// Claims carried inside the JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "appid")]
    pub app_id: String,
    #[serde(rename = "userid")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// JSON object serialized as a string
    #[serde(rename = "authcookie", default, skip_serializing_if = "Option::is_none")]
    pub auth_cookie: Option<String>,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

impl TokenClaims {
    /// Claims issued now and valid for `ttl`.
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            app_id: app_id.into(),
            user_id: user_id.into(),
            nickname: None,
            auth_cookie: None,
            exp: now + ttl.num_seconds(),
            iat: now,
            nbf: Some(now),
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn with_auth_cookie(mut self, cookie: &serde_json::Value) -> TokenResult<Self> {
        let encoded =
            serde_json::to_string(cookie).map_err(|e| TokenError::Encoding(e.to_string()))?;
        self.auth_cookie = Some(encoded);
        Ok(self)
    }

    /// The auth cookie as a JSON object; anything else is dropped.
    pub fn auth_cookie_value(&self) -> Option<serde_json::Value> {
        self.auth_cookie
            .as_deref()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .filter(serde_json::Value::is_object)
    }
}
