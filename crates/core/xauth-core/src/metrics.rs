//! Counter sink injected into the dispatcher.

use crate::auth_type::ClientAuthenticationType;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters incremented at well-defined points of the dispatch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterKind {
    ResultsAccepted,
    ResultsData,
    ResultsDenied,
    QueueFullErrors,
    QueueTimeouts,
    HttpErrors,
    HttpTimeouts,
    /// Local failures that never reached a provider
    Errors,
}

impl CounterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CounterKind::ResultsAccepted => "results_accepted",
            CounterKind::ResultsData => "results_data",
            CounterKind::ResultsDenied => "results_denied",
            CounterKind::QueueFullErrors => "queue_full_errors",
            CounterKind::QueueTimeouts => "queue_timeouts",
            CounterKind::HttpErrors => "http_errors",
            CounterKind::HttpTimeouts => "http_timeouts",
            CounterKind::Errors => "errors",
        }
    }
}

pub trait AuthMetrics: Send + Sync {
    fn increment(&self, auth_type: ClientAuthenticationType, counter: CounterKind);

    /// Round-trip time of a provider call, including time spent queued.
    fn record_latency(&self, _auth_type: ClientAuthenticationType, _latency: Duration) {}
}

/// Discards everything.
pub struct NoopMetrics;

impl AuthMetrics for NoopMetrics {
    fn increment(&self, _auth_type: ClientAuthenticationType, _counter: CounterKind) {}
}

/// Keeps counts in memory; handy for diagnostics and assertions.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: DashMap<(ClientAuthenticationType, CounterKind), u64>,
    latencies: DashMap<ClientAuthenticationType, (u64, Duration)>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, auth_type: ClientAuthenticationType, counter: CounterKind) -> u64 {
        self.counters
            .get(&(auth_type, counter))
            .map(|entry| *entry.value())
            .unwrap_or(0)
    }

    /// Sum of one counter across all authentication types.
    pub fn total(&self, counter: CounterKind) -> u64 {
        self.counters
            .iter()
            .filter(|entry| entry.key().1 == counter)
            .map(|entry| *entry.value())
            .sum()
    }

    pub fn average_latency(&self, auth_type: ClientAuthenticationType) -> Option<Duration> {
        self.latencies.get(&auth_type).and_then(|entry| {
            let (samples, total) = *entry.value();
            u32::try_from(samples)
                .ok()
                .filter(|n| *n > 0)
                .map(|n| total / n)
        })
    }

    pub fn snapshot(&self) -> Vec<(ClientAuthenticationType, CounterKind, u64)> {
        let mut rows: Vec<_> = self
            .counters
            .iter()
            .map(|entry| (entry.key().0, entry.key().1, *entry.value()))
            .collect();
        rows.sort_by_key(|(t, c, _)| (*t, c.as_str()));
        rows
    }
}

impl AuthMetrics for InMemoryMetrics {
    fn increment(&self, auth_type: ClientAuthenticationType, counter: CounterKind) {
        *self.counters.entry((auth_type, counter)).or_insert(0) += 1;
    }

    fn record_latency(&self, auth_type: ClientAuthenticationType, latency: Duration) {
        let mut entry = self
            .latencies
            .entry(auth_type)
            .or_insert((0, Duration::ZERO));
        entry.0 += 1;
        entry.1 += latency;
    }
}
