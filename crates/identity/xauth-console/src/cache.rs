//! Per-`jku` key cache with background refresh.

use crate::error::{CertificateError, CertificateResult};
use crate::fetcher::JwksFetcher;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Decoding keys by `kid`.
pub type KeyMap = HashMap<String, DecodingKey>;

/// Keys of one endpoint as of the last successful fetch.
#[derive(Clone)]
pub struct KeySnapshot {
    pub keys: Arc<KeyMap>,
    pub fetched_at: DateTime<Utc>,
}

struct CacheEntry {
    keys: watch::Sender<Option<KeySnapshot>>,
    refresh: AbortHandle,
}

struct CacheInner {
    fetcher: Arc<dyn JwksFetcher>,
    refresh_interval: Duration,
    entries: DashMap<String, Arc<CacheEntry>>,
}

/// Shared JWKS cache.
///
/// The first reference to a `jku` creates its entry and starts a refresh task
/// that fetches immediately and then every `refresh_interval`. Entries live as
/// long as the cache. A failed refresh keeps the previous keys.
#[derive(Clone)]
pub struct CertificateCache {
    inner: Arc<CacheInner>,
}

impl CertificateCache {
    pub fn new(fetcher: Arc<dyn JwksFetcher>, refresh_interval: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                refresh_interval,
                entries: DashMap::new(),
            }),
        }
    }

    /// Keys for `jku`, waiting at most `timeout` for the first fetch.
    pub async fn keys_for(&self, jku: &str, timeout: Duration) -> CertificateResult<Arc<KeyMap>> {
        let mut receiver = self.entry(jku).keys.subscribe();

        let snapshot = tokio::time::timeout(timeout, receiver.wait_for(Option::is_some))
            .await
            .map_err(|_| CertificateError::RetrievalTimeout)?
            .map_err(|_| CertificateError::RetrievalTimeout)?
            .clone();

        snapshot
            .map(|snapshot| snapshot.keys)
            .ok_or(CertificateError::RetrievalTimeout)
    }

    /// Time of the last successful fetch for `jku`, if any.
    pub fn last_update(&self, jku: &str) -> Option<DateTime<Utc>> {
        self.inner
            .entries
            .get(jku)
            .and_then(|entry| entry.keys.borrow().as_ref().map(|s| s.fetched_at))
    }

    /// Number of tracked endpoints.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    fn entry(&self, jku: &str) -> Arc<CacheEntry> {
        if let Some(entry) = self.inner.entries.get(jku) {
            return entry.clone();
        }

        match self.inner.entries.entry(jku.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(vacant) => {
                let (keys, _) = watch::channel(None);
                let task = tokio::spawn(refresh_loop(
                    Arc::downgrade(&self.inner),
                    jku.to_string(),
                    self.inner.refresh_interval,
                ));
                let entry = Arc::new(CacheEntry {
                    keys,
                    refresh: task.abort_handle(),
                });
                vacant.insert(entry.clone());
                info!(jku, "Tracking certificate endpoint");
                entry
            }
        }
    }
}

impl CacheInner {
    async fn refresh(&self, jku: &str) {
        match self.fetcher.fetch(jku).await {
            Ok(set) => {
                let keys = decode_keys(jku, &set);
                info!(jku, keys = keys.len(), "Certificates refreshed");
                if let Some(entry) = self.entries.get(jku) {
                    entry.keys.send_replace(Some(KeySnapshot {
                        keys: Arc::new(keys),
                        fetched_at: Utc::now(),
                    }));
                }
            }
            Err(err) => warn!(jku, error = %err, "Certificate refresh failed"),
        }
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        for entry in self.entries.iter() {
            entry.refresh.abort();
        }
    }
}

async fn refresh_loop(inner: Weak<CacheInner>, jku: String, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.refresh(&jku).await;
    }

    debug!(jku = %jku, "Certificate refresh stopped");
}

fn decode_keys(jku: &str, set: &JwkSet) -> KeyMap {
    set.keys
        .iter()
        .filter_map(|jwk| {
            let kid = jwk.common.key_id.clone()?;
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some((kid, key)),
                Err(err) => {
                    warn!(jku, kid = %kid, error = %err, "Skipping unusable key");
                    None
                }
            }
        })
        .collect()
}
