use crate::request::{ProviderRequest, QueueResponse};
use async_trait::async_trait;
use std::time::Duration;

/// Submission point for provider calls.
///
/// Implementations never block the caller on a full or offline queue: those
/// cases are answered immediately with the matching result code.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    /// Submit a request; resolves once the provider answered or the queue gave up.
    async fn enqueue(&self, request: ProviderRequest, retry_count: u32) -> QueueResponse;

    fn stats(&self) -> QueueStats;
}

/// Limits and timings of a provider queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub max_concurrent_requests: usize,
    pub max_queued_requests: usize,
    pub request_timeout: Duration,
    pub queue_timeout: Duration,
    /// Consecutive errors or timeouts that take the provider offline
    pub offline_error_threshold: u32,
    pub offline_retry_interval: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 50,
            max_queued_requests: 5000,
            request_timeout: Duration::from_millis(30_000),
            queue_timeout: Duration::from_millis(60_000),
            offline_error_threshold: 10,
            offline_retry_interval: Duration::from_millis(30_000),
        }
    }
}

impl QueueSettings {
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_max_queued_requests(mut self, max: usize) -> Self {
        self.max_queued_requests = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    pub fn with_offline_threshold(mut self, errors: u32, retry_interval: Duration) -> Self {
        self.offline_error_threshold = errors;
        self.offline_retry_interval = retry_interval;
        self
    }
}

/// Point-in-time view of a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub in_flight: usize,
    pub queued: usize,
    pub offline: bool,
    pub consecutive_errors: u32,
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_timeouts: u64,
}
