//! NF discovery cache
//!
//! Caches NRF search results per (target NF type, query fingerprint) with an
//! expiry derived from the NRF-provided validity period. Lookups never return
//! an expired entry; a background sweeper removes what lookups have not
//! already evicted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::models::NfProfile;

/// Cache key: target NF type plus the canonical query fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub target_nf_type: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(target_nf_type: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            target_nf_type: target_nf_type.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

struct CacheEntry {
    profiles: Vec<NfProfile>,
    expires_at: Instant,
}

/// TTL cache of NRF search results.
pub struct NfDiscoveryCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl NfDiscoveryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached profiles for a key, evicting the entry first when it
    /// has expired.
    pub fn lookup(&self, key: &CacheKey) -> Option<Vec<NfProfile>> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.profiles.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a fresh search result with its validity period.
    pub fn insert(&self, key: CacheKey, profiles: Vec<NfProfile>, validity: Duration) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key,
            CacheEntry {
                profiles,
                expires_at: Instant::now() + validity,
            },
        );
    }

    /// Remove a deregistered NF instance from every entry. Entries left empty
    /// are dropped so the next lookup goes back to the NRF.
    pub fn remove_nf_instance(&self, nf_instance_id: &str) -> bool {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let mut removed = false;
        entries.retain(|_, entry| {
            let before = entry.profiles.len();
            entry.profiles.retain(|p| p.nf_instance_id != nf_instance_id);
            removed |= entry.profiles.len() != before;
            !entry.profiles.is_empty()
        });
        removed
    }

    /// Drop all expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NfDiscoveryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Background sweeper: evicts expired entries every `interval` until the
/// token is cancelled.
pub async fn run_cache_sweeper(
    cache: std::sync::Arc<NfDiscoveryCache>,
    interval: Duration,
    cancel: CancellationToken,
) {
    log::info!("NF cache sweeper started, interval {}s", interval.as_secs());
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = cache.evict_expired();
                if evicted > 0 {
                    log::debug!("NF cache sweeper evicted {evicted} expired entries");
                }
            }
            _ = cancel.cancelled() => {
                log::info!("NF cache sweeper shutting down");
                return;
            }
        }
    }
}
