//! HTTP transport used by provider queues.

use crate::error::{QueueError, QueueResult, TransportError};
use crate::request::{HttpMethod, ProviderRequest};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// Successful (2xx) provider answer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform one HTTP exchange. Non-2xx answers are reported as
    /// [`TransportError::Status`].
    async fn send(
        &self,
        request: &ProviderRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> QueueResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("xauth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| QueueError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ProviderRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        }
        .timeout(timeout);

        if let Some(content_type) = &request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!(method = %request.method, status = status.as_u16(), "Provider answered");

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}
