use crate::auth_type::ClientAuthenticationType;
use serde::{Deserialize, Serialize};

/// Authentication attempt sent by a connecting client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub user_id: String,
    pub application_id: String,
    pub application_version: String,
    pub region: String,
    pub client_authentication_type: ClientAuthenticationType,
    /// Raw query string as typed by the client, e.g. `user=a&token=b`
    pub client_authentication_params: Option<String>,
    pub client_authentication_data: Option<AuthPayload>,
}

impl AuthenticateRequest {
    pub fn new(user_id: impl Into<String>, auth_type: ClientAuthenticationType) -> Self {
        Self {
            user_id: user_id.into(),
            application_id: String::new(),
            application_version: String::new(),
            region: String::new(),
            client_authentication_type: auth_type,
            client_authentication_params: None,
            client_authentication_data: None,
        }
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.client_authentication_params = Some(params.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<AuthPayload>) -> Self {
        self.client_authentication_data = Some(data.into());
        self
    }

    pub fn with_application(
        mut self,
        application_id: impl Into<String>,
        application_version: impl Into<String>,
    ) -> Self {
        self.application_id = application_id.into();
        self.application_version = application_version.into();
        self
    }

    pub fn has_client_params(&self) -> bool {
        self.client_authentication_params
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }

    pub fn has_post_data(&self) -> bool {
        self.client_authentication_data.is_some()
    }
}

/// Untyped post data attached to an authentication request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AuthPayload {
    Text(String),
    Bytes(Vec<u8>),
    Map(serde_json::Map<String, serde_json::Value>),
    /// Anything else the client managed to send (numbers, arrays, ...).
    /// Never forwarded to a provider.
    Other(serde_json::Value),
}

impl AuthPayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AuthPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            AuthPayload::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthPayload::Text(_) => "text",
            AuthPayload::Bytes(_) => "bytes",
            AuthPayload::Map(_) => "map",
            AuthPayload::Other(_) => "other",
        }
    }
}

impl From<serde_json::Value> for AuthPayload {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => AuthPayload::Text(text),
            serde_json::Value::Object(map) => AuthPayload::Map(map),
            other => AuthPayload::Other(other),
        }
    }
}

impl From<String> for AuthPayload {
    fn from(text: String) -> Self {
        AuthPayload::Text(text)
    }
}

impl From<&str> for AuthPayload {
    fn from(text: &str) -> Self {
        AuthPayload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for AuthPayload {
    fn from(bytes: Vec<u8>) -> Self {
        AuthPayload::Bytes(bytes)
    }
}
