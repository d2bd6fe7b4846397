//! Time-expiring cache of materialized records.

use crate::records::CachedRecord;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct CacheEntry {
    item: Arc<CachedRecord>,
    // None when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Record cache keyed by canonical path (`id` or `id-alt-label`).
///
/// Entries expire a fixed time after insertion. Reads treat expired entries
/// as misses; the sweeper removes them.
pub struct RecordCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RecordCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, path: &str) -> Option<Arc<CachedRecord>> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(path)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| Arc::clone(&entry.item));

        match hit {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    /// Insert `item` under `path`; `ttl` overrides the cache-wide lifetime.
    pub fn insert(&self, path: impl Into<String>, item: Arc<CachedRecord>, ttl: Option<Duration>) {
        let expires_at = Instant::now().checked_add(ttl.unwrap_or(self.ttl));
        self.entries
            .insert(path.into(), CacheEntry { item, expires_at });
    }

    pub fn invalidate(&self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    /// Drop the canonical entry of `id` and every alternate entry.
    pub fn invalidate_identity(&self, id: &str) -> usize {
        let alternate_prefix = format!("{}-alt-", id);
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key != id && !key.starts_with(&alternate_prefix));
        before.saturating_sub(self.entries.len())
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Run `cleanup_expired` every `interval` until `token` is cancelled or
    /// the cache is dropped. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        let removed = cache.cleanup_expired();
                        if removed > 0 {
                            log::debug!("Swept {} expired cache entries", removed);
                        }
                    }
                }
            }
        })
    }
}
