use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use xauth_core::QueueResultCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// Fully merged call to a provider endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
}

impl ProviderRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
            content_type: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body.into()),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Query string part of the url, if any.
    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }
}

/// What a queue answers for one submitted request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueResponse {
    pub result: QueueResultCode,
    /// HTTP status, when the provider answered at all
    pub status: Option<u16>,
    pub body: Bytes,
    pub error: Option<String>,
    /// Time between submission and answer, queueing included
    pub elapsed: Duration,
}

impl QueueResponse {
    pub fn success(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            result: QueueResultCode::Success,
            status: Some(status),
            body: body.into(),
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn failure(result: QueueResultCode, error: impl Into<String>) -> Self {
        Self {
            result,
            status: None,
            body: Bytes::new(),
            error: Some(error.into()),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == QueueResultCode::Success
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Human readable reason for a failed response.
    pub fn reason(&self) -> String {
        match &self.error {
            Some(error) => format!("{}: {}", self.result, error),
            None => self.result.to_string(),
        }
    }
}
