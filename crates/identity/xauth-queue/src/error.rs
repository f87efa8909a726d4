//! Queue and transport error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request queue is not running")]
    Closed,
}

/// Failure of a single HTTP exchange with a provider.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Provider returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Only failures that never reached the provider are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}
