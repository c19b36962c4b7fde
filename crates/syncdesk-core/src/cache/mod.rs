// ── Cache-aside store ──
//
// TTL-keyed storage for read results with group-based invalidation.
// Expiry is checked lazily on read; an optional sweeper task removes
// expired entries for memory hygiene only.
//
// Each group carries a generation bumped on invalidation. A read that
// captured the generation before its remote call only writes through if
// no invalidation happened meanwhile, so a write that lands while the
// read is in flight cannot be shadowed by the older result.

mod key;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use key::CacheKey;

/// One stored read result.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<Value>,
    expires_at: Instant,
    group: String,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 before any lookup.
    pub hit_rate: f64,
}

/// Process-wide read cache.
///
/// Backed by `DashMap`: every single-key operation is atomic, and group
/// invalidation removes each entry under its shard lock, so a concurrent
/// `get` sees an entry either fully present or fully gone.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    generations: DashMap<String, u64>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live entry. Expired entries are removed and reported absent.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Value>> {
        let now = Instant::now();
        let found = self.entries.get(key.as_str()).map(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(Arc::clone(&entry.value))
            }
        });

        match found {
            Some(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "cache hit");
                Some(value)
            }
            Some(None) => {
                // The read guard is released above; removing under the
                // same shard while holding it would deadlock.
                self.entries.remove_if(key.as_str(), |_, e| e.is_expired(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "cache entry expired");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` for `ttl`. A zero TTL stores nothing.
    pub fn set(&self, key: &CacheKey, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries.insert(key.as_str().to_owned(), entry_for(key, value, ttl));
    }

    /// Current invalidation generation of `group`.
    pub fn generation(&self, group: &str) -> u64 {
        self.generations.get(group).map_or(0, |g| *g)
    }

    /// Store `value` only if `group` has not been invalidated since
    /// `generation` was read. Returns whether the value was stored.
    pub fn set_if_current(
        &self,
        key: &CacheKey,
        value: Value,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        if ttl.is_zero() {
            return false;
        }
        // The generation guard is held across the insert so an
        // invalidation either precedes the check or removes the entry.
        let current = self.generations.entry(key.group().to_owned()).or_insert(0);
        if *current != generation {
            trace!(key = %key, "read overtaken by invalidation, not cached");
            return false;
        }
        self.entries.insert(key.as_str().to_owned(), entry_for(key, value, ttl));
        true
    }

    /// Drop a single entry.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key.as_str()).is_some()
    }

    /// Drop every entry tagged with `group`. Returns how many were removed.
    pub fn invalidate_group(&self, group: &str) -> usize {
        *self.generations.entry(group.to_owned()).or_insert(0) += 1;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.group != group;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(group, removed, "cache group invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        for mut generation in self.generations.iter_mut() {
            *generation += 1;
        }
        self.entries.clear();
    }

    /// Remove all expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        CacheStats {
            size: self.entries.len(),
            hits,
            misses,
            hit_rate,
        }
    }

    /// Spawn a background task sweeping expired entries every `interval`.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, "swept expired cache entries");
                        }
                    }
                }
            }
        })
    }
}

fn entry_for(key: &CacheKey, value: Value, ttl: Duration) -> CacheEntry {
    CacheEntry {
        value: Arc::new(value),
        expires_at: Instant::now() + ttl,
        group: key.group().to_owned(),
    }
}
