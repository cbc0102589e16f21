//! Time-bounded key set cache.
//!
//! Entries are immutable `Arc<KeySet>` snapshots. Readers share the map lock; a refresh
//! swaps in a new snapshot, so a verification holding the old one is unaffected. Fetches
//! for the same issuer are single-flight: concurrent misses wait on a per-issuer gate and
//! reuse whatever the first fetch stored.
//!
//! A forced refresh (a token names a key id the snapshot lacks) is allowed once per
//! minimum refresh interval per issuer. Inside the interval the current snapshot is
//! returned unchanged, so made-up key ids cannot drive traffic to the issuer.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::error::AuthzResult;
use crate::jwks::KeySet;

/// Upper bound on distinct issuers kept; the oldest entry is evicted beyond it.
pub const MAX_CACHED_ISSUERS: usize = 64;

/// Default minimum interval between forced refreshes of one issuer's key set.
pub const DEFAULT_MIN_REFRESH: Duration = Duration::from_secs(30);

/// Where a key set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySetOrigin {
    /// Served from a cache entry fetched by an earlier request.
    Cache,
    /// Fetched for this request.
    Network,
}

#[derive(Debug)]
struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// Last forced refresh, carried across TTL refetches.
    refreshed_at: Option<DateTime<Utc>>,
}

/// Issuer URL -> key set snapshot.
#[derive(Debug)]
pub struct KeySetCache {
    ttl: chrono::Duration,
    min_refresh: chrono::Duration,
    entries: RwLock<HashMap<String, CachedKeySet>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeySetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: to_chrono(ttl),
            min_refresh: to_chrono(DEFAULT_MIN_REFRESH),
            entries: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Set the minimum interval between forced refreshes; zero allows one per request.
    pub fn with_min_refresh(mut self, interval: Duration) -> Self {
        self.min_refresh = to_chrono(interval);
        self
    }

    /// Unexpired key set for `issuer`.
    pub async fn get(&self, issuer: &str) -> Option<Arc<KeySet>> {
        let entries = self.entries.read().await;
        entries
            .get(issuer)
            .filter(|entry| Utc::now() < entry.expires_at)
            .map(|entry| entry.keys.clone())
    }

    /// When the entry for `issuer` was fetched, expired or not.
    pub async fn fetched_at(&self, issuer: &str) -> Option<DateTime<Utc>> {
        let entries = self.entries.read().await;
        entries.get(issuer).map(|entry| entry.fetched_at)
    }

    /// Store a snapshot, replacing any previous one.
    pub async fn insert(&self, issuer: &str, keys: Arc<KeySet>) {
        self.store(issuer, keys, false).await;
    }

    async fn store(&self, issuer: &str, keys: Arc<KeySet>, forced: bool) {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(issuer) && entries.len() >= MAX_CACHED_ISSUERS {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(issuer = %oldest, "evicting key set");
                entries.remove(&oldest);
            }
        }

        let refreshed_at = if forced {
            Some(now)
        } else {
            entries.get(issuer).and_then(|entry| entry.refreshed_at)
        };
        entries.insert(
            issuer.to_string(),
            CachedKeySet {
                keys,
                fetched_at: now,
                expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
                refreshed_at,
            },
        );
    }

    /// Drop the entry for `issuer`.
    pub async fn invalidate(&self, issuer: &str) {
        self.entries.write().await.remove(issuer);
    }

    /// Number of cached issuers, including expired entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Cached key set, or the result of `fetch` run at most once per issuer at a time.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        issuer: &str,
        fetch: F,
    ) -> AuthzResult<(Arc<KeySet>, KeySetOrigin)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthzResult<KeySet>>,
    {
        if let Some(keys) = self.get(issuer).await {
            return Ok((keys, KeySetOrigin::Cache));
        }

        let gate = self.gate(issuer).await;
        let result = {
            let _flight = gate.lock().await;
            // A fetch that held the gate before us may have filled the entry.
            if let Some(keys) = self.get(issuer).await {
                Ok((keys, KeySetOrigin::Network))
            } else {
                match fetch().await {
                    Ok(keys) => {
                        let keys = Arc::new(keys);
                        self.insert(issuer, keys.clone()).await;
                        Ok((keys, KeySetOrigin::Network))
                    }
                    Err(e) => Err(e),
                }
            }
        };
        self.release_gate(issuer, gate).await;
        result
    }

    /// Replace `stale` with a fresh fetch, unless another task already replaced it or the
    /// issuer was force-refreshed within the minimum interval. In both cases the current
    /// snapshot is returned without fetching.
    pub async fn refresh<F, Fut>(
        &self,
        issuer: &str,
        stale: &Arc<KeySet>,
        fetch: F,
    ) -> AuthzResult<Arc<KeySet>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthzResult<KeySet>>,
    {
        let gate = self.gate(issuer).await;
        let result = {
            let _flight = gate.lock().await;
            match self.current_or_throttled(issuer, stale).await {
                Some(current) => Ok(current),
                None => match fetch().await {
                    Ok(keys) => {
                        let keys = Arc::new(keys);
                        self.store(issuer, keys.clone(), true).await;
                        Ok(keys)
                    }
                    Err(e) => Err(e),
                },
            }
        };
        self.release_gate(issuer, gate).await;
        result
    }

    /// Snapshot to use instead of fetching, if any.
    async fn current_or_throttled(&self, issuer: &str, stale: &Arc<KeySet>) -> Option<Arc<KeySet>> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let entry = entries.get(issuer)?;
        let live = now < entry.expires_at;
        if live && !Arc::ptr_eq(&entry.keys, stale) {
            return Some(entry.keys.clone());
        }
        let throttled = entry
            .refreshed_at
            .and_then(|at| at.checked_add_signed(self.min_refresh))
            .is_some_and(|until| now < until);
        if live && throttled {
            tracing::debug!(issuer = %issuer, "forced refresh within minimum interval, skipping fetch");
            return Some(entry.keys.clone());
        }
        None
    }

    async fn gate(&self, issuer: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        gates
            .entry(issuer.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_gate(&self, issuer: &str, gate: Arc<Mutex<()>>) {
        let mut gates = self.gates.lock().await;
        // One reference in the map, one held here: nobody else is waiting.
        if Arc::strong_count(&gate) <= 2 {
            gates.remove(issuer);
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
