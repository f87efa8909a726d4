use crate::error::{CertificateError, CertificateResult};
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Source of JWKS documents.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self, jku: &str) -> CertificateResult<JwkSet>;
}

#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    client: Client,
}

impl HttpJwksFetcher {
    pub fn new(timeout: Duration) -> CertificateResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CertificateError::Config(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, jku: &str) -> CertificateResult<JwkSet> {
        debug!(jku, "Fetching certificates");

        let set = self
            .client
            .get(jku)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;

        Ok(set)
    }
}
