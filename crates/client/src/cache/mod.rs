//! Bounded, time-expiring key/value cache with durable snapshots.
//!
//! Values are stored as JSON so heterogeneous results (product lists, single
//! products, statistics) share one cache and one snapshot. When the cache is
//! full, inserting a new key evicts the entry with the oldest write
//! timestamp. Concurrent misses on the same key in [`TtlCache::get_or_fetch`]
//! share a single producer call.

pub mod maintenance;
pub mod store;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock, millis};
use crate::error::{ClientError, PersistError};

pub use maintenance::MaintenanceHandle;
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};

/// A cached value with its write time and expiry, both in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
    pub expires_at: i64,
    /// First-insertion order, breaking eviction ties between equal timestamps.
    #[serde(skip)]
    seq: u64,
}

impl<T> CacheEntry<T> {
    /// An entry is still valid at exactly its expiry instant.
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

/// Configuration for [`TtlCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub max_size: usize,
    /// TTL used when `set` is called without one.
    pub default_ttl: Duration,
    /// Whether snapshots are written to the store.
    pub enable_persistence: bool,
    /// How often maintenance writes a snapshot.
    pub persist_interval: Duration,
    /// How often maintenance sweeps expired entries.
    pub cleanup_interval: Duration,
    /// Delay before re-writing a snapshot that had stale entries on load.
    pub reload_persist_delay: Duration,
    /// Number of entries kept when a snapshot exceeds the store quota.
    pub quota_retry_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            default_ttl: Duration::from_secs(5 * 60),
            enable_persistence: true,
            persist_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
            reload_persist_delay: Duration::from_secs(1),
            quota_retry_entries: 50,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_persistence(mut self, enabled: bool) -> Self {
        self.enable_persistence = enabled;
        self
    }

    #[must_use]
    pub const fn with_persist_interval(mut self, interval: Duration) -> Self {
        self.persist_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    /// Percentage of lookups that hit, rounded; 0 before any lookup.
    pub hit_rate: u32,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// One line of [`TtlCache::debug_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEntry {
    pub key: String,
    pub expired: bool,
    pub age: Duration,
}

/// Diagnostic view of the cache contents.
#[derive(Debug, Clone)]
pub struct CacheDebug {
    pub size: usize,
    pub entries: Vec<DebugEntry>,
    pub stats: CacheStats,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry<Value>>,
    next_seq: u64,
    hits: u64,
    misses: u64,
}

impl CacheState {
    /// Keep a key's original position when it is overwritten.
    fn seq_for(&mut self, key: &str) -> u64 {
        if let Some(existing) = self.entries.get(key) {
            return existing.seq;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

fn write_order<T>(a: &CacheEntry<T>, b: &CacheEntry<T>) -> std::cmp::Ordering {
    a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq))
}

type InFlight = Shared<BoxFuture<'static, Result<Value, Arc<ClientError>>>>;

struct CacheInner {
    config: CacheConfig,
    state: Mutex<CacheState>,
    inflight: Mutex<HashMap<String, InFlight>>,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    persisting: AtomicBool,
    changes: watch::Sender<u64>,
}

/// Shared TTL cache handle. Clones refer to the same cache.
#[derive(Clone)]
pub struct TtlCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.inner.config)
            .field("size", &self.len())
            .finish_non_exhaustive()
    }
}

/// Clears the re-entrancy flag when a persistence run ends.
struct PersistingGuard<'a>(&'a AtomicBool);

impl Drop for PersistingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn hit_rate(hits: u64, misses: u64) -> u32 {
    let total = hits + misses;
    if total == 0 {
        return 0;
    }
    // round(100 * hits / total), half away from zero
    u32::try_from((200 * hits + total) / (2 * total)).unwrap_or(100)
}

impl TtlCache {
    /// Create a cache, loading any snapshot already in `store`.
    #[must_use]
    pub fn new(config: CacheConfig, store: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = watch::channel(0);
        let cache = Self {
            inner: Arc::new(CacheInner {
                config,
                state: Mutex::new(CacheState::default()),
                inflight: Mutex::new(HashMap::new()),
                store,
                clock,
                persisting: AtomicBool::new(false),
                changes,
            }),
        };
        cache.load_from_persistence();
        cache
    }

    /// A cache whose snapshots live only in memory, on the system clock.
    #[must_use]
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(SystemClock),
        )
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    fn emit_change(&self) {
        self.inner.changes.send_modify(|version| *version += 1);
    }

    /// Receive a version bump whenever the cache contents change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or overwrite `key`, expiring after `ttl` (default TTL if `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized.
    pub fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), ClientError> {
        let json = serde_json::to_value(value)?;
        self.insert_json(key, json, ttl);
        Ok(())
    }

    fn insert_json(&self, key: &str, data: Value, ttl: Option<Duration>) {
        let now = self.now();
        let ttl = ttl.unwrap_or(self.inner.config.default_ttl);
        let evicted = {
            let mut state = self.state();
            let entry = CacheEntry {
                data,
                timestamp: now,
                expires_at: now.saturating_add(millis(ttl)),
                seq: state.seq_for(key),
            };
            let evicted = if state.entries.len() >= self.inner.config.max_size
                && !state.entries.contains_key(key)
            {
                let oldest = state
                    .entries
                    .iter()
                    .min_by(|a, b| write_order(a.1, b.1))
                    .map(|(k, _)| k.clone());
                oldest.inspect(|k| {
                    state.entries.remove(k);
                })
            } else {
                None
            };
            state.entries.insert(key.to_owned(), entry);
            evicted
        };

        if let Some(evicted) = evicted {
            tracing::debug!(key = %evicted, "Cache evicted oldest");
            self.remove_persisted(&[evicted]);
        }
        tracing::debug!(key, "Cache set");
        self.emit_change();
    }

    /// Typed lookup. A value that no longer decodes as `T` is dropped.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = self.get_json(key)?;
        match serde_json::from_value(json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cached value has unexpected shape, dropping");
                self.delete(key);
                None
            }
        }
    }

    /// Raw lookup, counting a hit or a miss. Expired entries are removed.
    pub fn get_json(&self, key: &str) -> Option<Value> {
        let now = self.now();
        let mut state = self.state();

        let Some(entry) = state.entries.get(key) else {
            state.misses += 1;
            drop(state);
            tracing::debug!(key, "Cache miss");
            return None;
        };

        if !entry.is_expired(now) {
            let data = entry.data.clone();
            state.hits += 1;
            drop(state);
            tracing::debug!(key, "Cache hit");
            return Some(data);
        }

        state.misses += 1;
        state.entries.remove(key);
        drop(state);
        tracing::debug!(key, "Cache entry expired");
        self.emit_change();
        None
    }

    /// Fresh value without touching the hit/miss counters.
    fn peek_json(&self, key: &str) -> Option<Value> {
        let now = self.now();
        self.state()
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
    }

    /// Whether `key` holds a fresh value. Does not count as a lookup.
    pub fn has(&self, key: &str) -> bool {
        let now = self.now();
        let expired = match self.state().entries.get(key) {
            None => return false,
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            self.delete(key);
        }
        !expired
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.state().entries.remove(key).is_some();
        if removed {
            tracing::debug!(key, "Cache delete");
            self.emit_change();
        }
        removed
    }

    /// Remove every entry, reset counters and wipe the stored snapshot.
    pub fn clear(&self) {
        {
            let mut state = self.state();
            state.entries.clear();
            state.hits = 0;
            state.misses = 0;
        }
        self.emit_change();

        if self.inner.config.enable_persistence
            && let Err(e) = self.inner.store.remove()
        {
            tracing::warn!(error = %e, "Failed to remove cache snapshot");
        }
        tracing::debug!("Cache cleared");
    }

    /// Remove every key matching `pattern` (unanchored regex search).
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize, regex::Error> {
        let regex = regex::Regex::new(pattern)?;

        let removed: Vec<String> = {
            let mut state = self.state();
            let keys: Vec<String> = state
                .entries
                .keys()
                .filter(|k| regex.is_match(k))
                .cloned()
                .collect();
            for key in &keys {
                state.entries.remove(key);
            }
            keys
        };

        if !removed.is_empty() {
            self.remove_persisted(&removed);
            self.emit_change();
            tracing::debug!(pattern, count = removed.len(), "Cache invalidated pattern");
        }
        Ok(removed.len())
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_inner(true)
    }

    /// Persistence runs purge with `notify` off so they never trigger themselves.
    fn purge_expired_inner(&self, notify: bool) -> usize {
        let now = self.now();
        let expired: Vec<String> = {
            let mut state = self.state();
            let keys: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &keys {
                state.entries.remove(key);
            }
            keys
        };

        if !expired.is_empty() {
            self.remove_persisted(&expired);
            if notify {
                self.emit_change();
            }
            tracing::debug!(count = expired.len(), "Cache cleanup removed expired entries");
        }
        expired.len()
    }

    /// Return the cached value for `key`, or run `producer` and cache its result.
    ///
    /// Concurrent callers missing on the same key await one shared producer
    /// call. Failures are not cached and reach every waiting caller.
    ///
    /// # Errors
    ///
    /// Returns the producer's error, or a decode error if the cached value
    /// does not match `T`.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T, ClientError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        if let Some(hit) = self.get::<T>(key) {
            return Ok(hit);
        }

        let shared = {
            let mut inflight = self.inflight();
            if let Some(existing) = inflight.get(key) {
                tracing::debug!(key, "Joining in-flight fetch");
                existing.clone()
            } else if let Some(fresh) = self.peek_json(key) {
                // Another caller finished between our miss and taking the lock
                return Ok(serde_json::from_value(fresh)?);
            } else {
                let cache = self.clone();
                let owned_key = key.to_owned();
                let fetch = producer();
                let shared = async move {
                    let outcome = match fetch.await {
                        Ok(value) => serde_json::to_value(&value)
                            .map_err(|e| Arc::new(ClientError::from(e))),
                        Err(e) => Err(Arc::new(e)),
                    };
                    if let Ok(json) = &outcome {
                        cache.insert_json(&owned_key, json.clone(), ttl);
                    }
                    cache.inflight().remove(&owned_key);
                    outcome
                }
                .boxed()
                .shared();
                inflight.insert(key.to_owned(), shared.clone());
                shared
            }
        };

        let json = shared.await.map_err(ClientError::from_shared)?;
        Ok(serde_json::from_value(json)?)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        let timestamps = || state.entries.values().map(|e| e.timestamp);

        CacheStats {
            size: state.entries.len(),
            max_size: self.inner.config.max_size,
            hit_rate: hit_rate(state.hits, state.misses),
            oldest_entry: timestamps().min().and_then(DateTime::from_timestamp_millis),
            newest_entry: timestamps().max().and_then(DateTime::from_timestamp_millis),
            hit_count: state.hits,
            miss_count: state.misses,
        }
    }

    /// Zero the hit and miss counters.
    pub fn reset_stats(&self) {
        let mut state = self.state();
        state.hits = 0;
        state.misses = 0;
    }

    /// Every entry with its age and expiry, oldest first.
    #[must_use]
    pub fn debug_snapshot(&self) -> CacheDebug {
        let now = self.now();
        let mut entries: Vec<DebugEntry> = self
            .state()
            .entries
            .iter()
            .map(|(key, entry)| DebugEntry {
                key: key.clone(),
                expired: entry.is_expired(now),
                age: Duration::from_millis(
                    u64::try_from(now.saturating_sub(entry.timestamp)).unwrap_or(0),
                ),
            })
            .collect();
        entries.sort_by(|a, b| b.age.cmp(&a.age).then_with(|| a.key.cmp(&b.key)));

        CacheDebug {
            size: entries.len(),
            entries,
            stats: self.stats(),
        }
    }

    /// Write a snapshot of all entries to the store.
    ///
    /// Never fails: if the store's quota is exceeded, expired entries are
    /// purged and a truncated snapshot is tried once; any remaining failure is
    /// logged and this cycle is skipped.
    pub fn persist(&self) {
        if !self.inner.config.enable_persistence
            || self.inner.persisting.swap(true, Ordering::SeqCst)
        {
            return;
        }
        let _guard = PersistingGuard(&self.inner.persisting);

        match self.write_snapshot(None) {
            Ok(count) => tracing::debug!(entries = count, "Cache saved"),
            Err(PersistError::QuotaExceeded { size, quota }) => {
                tracing::warn!(size, quota, "Cache snapshot exceeds quota, retrying with fewer entries");
                self.purge_expired_inner(false);
                match self.write_snapshot(Some(self.inner.config.quota_retry_entries)) {
                    Ok(count) => tracing::info!(entries = count, "Cache saved with fewer entries"),
                    Err(e) => tracing::error!(error = %e, "Unable to save cache even with fewer entries"),
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to save cache"),
        }
    }

    fn write_snapshot(&self, limit: Option<usize>) -> Result<usize, PersistError> {
        let (count, snapshot) = {
            let state = self.state();
            let mut entries: Vec<(&String, &CacheEntry<Value>)> = state.entries.iter().collect();
            entries.sort_by(|a, b| write_order(a.1, b.1));
            if let Some(limit) = limit {
                entries.truncate(limit);
            }
            (entries.len(), serde_json::to_string(&entries)?)
        };
        self.inner.store.save(&snapshot)?;
        Ok(count)
    }

    /// Drop one key from the stored snapshot without touching memory.
    pub fn delete_from_persistence(&self, key: &str) {
        self.remove_persisted(&[key.to_owned()]);
    }

    fn remove_persisted(&self, keys: &[String]) {
        if !self.inner.config.enable_persistence || keys.is_empty() {
            return;
        }

        let result = (|| -> Result<bool, PersistError> {
            let Some(raw) = self.inner.store.load()? else {
                return Ok(false);
            };
            let entries: Vec<(String, Value)> = serde_json::from_str(&raw)?;
            let total = entries.len();
            let kept: Vec<(String, Value)> = entries
                .into_iter()
                .filter(|(k, _)| !keys.contains(k))
                .collect();
            if kept.len() == total {
                return Ok(false);
            }
            self.inner.store.save(&serde_json::to_string(&kept)?)?;
            Ok(true)
        })();

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to remove keys from cache snapshot");
        }
    }

    /// Replace the in-memory entries with the stored snapshot's fresh entries.
    ///
    /// A snapshot that cannot be parsed is removed. When stale or malformed
    /// entries were dropped, the cleaned set is re-persisted after a delay.
    fn load_from_persistence(&self) {
        if !self.inner.config.enable_persistence {
            return;
        }

        let raw = match self.inner.store.load() {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cache snapshot");
                return;
            }
        };

        let entries: Vec<(String, Value)> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Corrupt cache snapshot, discarding");
                if let Err(e) = self.inner.store.remove() {
                    tracing::error!(error = %e, "Unable to remove corrupt cache snapshot");
                }
                return;
            }
        };

        let now = self.now();
        let total = entries.len();
        // Snapshots are written oldest first, so their order is the write order
        let valid: HashMap<String, CacheEntry<Value>> = entries
            .into_iter()
            .filter_map(|(key, raw)| {
                serde_json::from_value::<CacheEntry<Value>>(raw)
                    .ok()
                    .filter(|e| e.timestamp > 0 && e.expires_at > 0 && !e.is_expired(now))
                    .map(|e| (key, e))
            })
            .zip(0..)
            .map(|((key, entry), seq)| (key, CacheEntry { seq, ..entry }))
            .collect();
        let loaded = valid.len();

        {
            let mut state = self.state();
            state.entries = valid;
            state.next_seq = u64::try_from(loaded).unwrap_or(u64::MAX);
        }
        self.emit_change();
        tracing::debug!(entries = loaded, "Cache loaded from persistence");

        if loaded < total {
            self.schedule_persist(self.inner.config.reload_persist_delay);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use crate::clock::ManualClock;

    use super::*;

    const T0: i64 = 1_767_225_600_000;

    fn cache_with(config: CacheConfig, store: Arc<MemorySnapshotStore>) -> (TtlCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = TtlCache::new(config, store, clock.clone());
        (cache, clock)
    }

    fn cache() -> (TtlCache, Arc<ManualClock>) {
        cache_with(CacheConfig::default(), Arc::new(MemorySnapshotStore::new()))
    }

    #[test]
    fn test_get_before_and_after_ttl() {
        let (cache, clock) = cache();
        cache.set("k", &"v", Some(Duration::from_secs(10))).unwrap();

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get::<String>("k").as_deref(), Some("v"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get::<String>("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_default_ttl_applies() {
        let (cache, clock) = cache_with(
            CacheConfig::default().with_default_ttl(Duration::from_secs(1)),
            Arc::new(MemorySnapshotStore::new()),
        );
        cache.set("k", &1, None).unwrap();
        clock.advance(Duration::from_secs(2));
        assert!(!cache.has("k"));
    }

    #[test]
    fn test_eviction_removes_oldest_write() {
        let (cache, clock) = cache_with(
            CacheConfig::default().with_max_size(3),
            Arc::new(MemorySnapshotStore::new()),
        );
        for key in ["a", "b", "c"] {
            cache.set(key, &key, Some(Duration::from_secs(600))).unwrap();
            clock.advance(Duration::from_millis(10));
        }

        // Overwriting an existing key at capacity does not evict
        cache.set("a", &"a2", Some(Duration::from_secs(1))).unwrap();
        assert_eq!(cache.len(), 3);

        clock.advance(Duration::from_millis(10));
        cache.set("d", &"d", None).unwrap();

        assert_eq!(cache.len(), 3);
        assert!(!cache.has("b"));
        assert!(cache.has("a") && cache.has("c") && cache.has("d"));
    }

    #[test]
    fn test_invalidate_pattern_removes_only_matches() {
        let (cache, _) = cache();
        for key in [
            "product_1",
            "product_2",
            "search_apple_page_1",
            "category_healthy",
            "all_products",
        ] {
            cache.set(key, &0, None).unwrap();
        }

        assert_eq!(cache.invalidate_pattern("product_.*").unwrap(), 2);
        assert!(!cache.has("product_1") && !cache.has("product_2"));
        assert!(cache.has("search_apple_page_1"));
        assert!(cache.has("category_healthy"));
        assert!(cache.has("all_products"));

        assert!(cache.invalidate_pattern("(unclosed").is_err());
    }

    #[test]
    fn test_hit_rate_and_counters() {
        let (cache, _) = cache();
        assert_eq!(cache.stats().hit_rate, 0);

        cache.set("k", &1, None).unwrap();
        assert_eq!(cache.get::<i32>("k"), Some(1));
        assert_eq!(cache.get::<i32>("k"), Some(1));
        assert_eq!(cache.get::<i32>("missing"), None);
        assert!(cache.has("k"));

        let stats = cache.stats();
        assert_eq!((stats.hit_count, stats.miss_count), (2, 1));
        assert_eq!(stats.hit_rate, 67);

        cache.reset_stats();
        let stats = cache.stats();
        assert_eq!((stats.hit_count, stats.miss_count, stats.hit_rate), (0, 0, 0));
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_hit_rate_rounding() {
        assert_eq!(hit_rate(1, 1), 50);
        assert_eq!(hit_rate(1, 2), 33);
        assert_eq!(hit_rate(1, 7), 13);
        assert_eq!(hit_rate(5, 0), 100);
    }

    #[test]
    fn test_stats_report_entry_timestamps() {
        let (cache, clock) = cache();
        cache.set("old", &1, None).unwrap();
        clock.advance(Duration::from_secs(5));
        cache.set("new", &2, None).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.oldest_entry.unwrap().timestamp_millis(), T0);
        assert_eq!(stats.newest_entry.unwrap().timestamp_millis(), T0 + 5_000);

        let debug = cache.debug_snapshot();
        assert_eq!(debug.entries[0].key, "old");
        assert_eq!(debug.entries[0].age, Duration::from_secs(5));
    }

    #[test]
    fn test_snapshot_survives_restart_and_drops_expired() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (cache, clock) = cache_with(CacheConfig::default(), store.clone());
        cache.set("short", &"s", Some(Duration::from_secs(1))).unwrap();
        cache.set("long", &"l", Some(Duration::from_secs(600))).unwrap();
        cache.persist();

        clock.advance(Duration::from_secs(5));
        let reloaded = TtlCache::new(CacheConfig::default(), store.clone(), clock);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get::<String>("long").as_deref(), Some("l"));

        // Outside a runtime the cleaned set is written back immediately
        let snapshot: Vec<(String, Value)> =
            serde_json::from_str(&store.snapshot().unwrap()).unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_corrupt_snapshot_is_removed() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot("{not json"));
        let (cache, _) = cache_with(CacheConfig::default(), store.clone());
        assert!(cache.is_empty());
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let raw = format!(
            r#"[["good",{{"data":1,"timestamp":{T0},"expiresAt":{}}}],["bad",{{"data":2}}],["zero",{{"data":3,"timestamp":0,"expiresAt":0}}]]"#,
            T0 + 60_000
        );
        let store = Arc::new(MemorySnapshotStore::with_snapshot(raw));
        let (cache, _) = cache_with(CacheConfig::default(), store);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<i32>("good"), Some(1));
    }

    #[test]
    fn test_clear_wipes_snapshot_and_counters() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (cache, _) = cache_with(CacheConfig::default(), store.clone());
        cache.set("k", &1, None).unwrap();
        cache.get::<i32>("k");
        cache.persist();
        assert!(store.snapshot().is_some());

        cache.clear();
        assert!(cache.is_empty());
        assert!(store.snapshot().is_none());
        assert_eq!(cache.stats().hit_count, 0);
    }

    #[test]
    fn test_delete_from_persistence_keeps_memory() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (cache, _) = cache_with(CacheConfig::default(), store.clone());
        cache.set("a", &1, None).unwrap();
        cache.set("b", &2, None).unwrap();
        cache.persist();

        cache.delete_from_persistence("a");
        let snapshot: Vec<(String, Value)> =
            serde_json::from_str(&store.snapshot().unwrap()).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, "b");
        assert!(cache.has("a"));
    }

    fn fill(cache: &TtlCache, n: usize) {
        for i in 0..n {
            cache.set(&format!("key_{i:02}"), &0, Some(Duration::from_secs(600))).unwrap();
        }
    }

    #[test]
    fn test_quota_retry_keeps_first_entries() {
        let unlimited = Arc::new(MemorySnapshotStore::new());
        let (cache, _) = cache_with(CacheConfig::default(), unlimited.clone());
        fill(&cache, 60);
        cache.persist();
        let full_len = unlimited.snapshot().unwrap().len();

        let limited = Arc::new(MemorySnapshotStore::new().with_quota(full_len * 55 / 60));
        let (cache, _) = cache_with(CacheConfig::default(), limited.clone());
        fill(&cache, 60);
        cache.persist();

        let snapshot: Vec<(String, Value)> =
            serde_json::from_str(&limited.snapshot().unwrap()).unwrap();
        assert_eq!(snapshot.len(), 50);
        assert_eq!(snapshot[0].0, "key_00");
        assert_eq!(cache.len(), 60);
    }

    #[test]
    fn test_quota_failure_is_swallowed() {
        let store = Arc::new(MemorySnapshotStore::new().with_quota(1));
        let (cache, _) = cache_with(CacheConfig::default(), store.clone());
        fill(&cache, 3);
        cache.persist();
        assert!(store.snapshot().is_none());

        // The re-entrancy flag was released
        cache.persist();
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_persist_does_not_notify_subscribers() {
        let store = Arc::new(MemorySnapshotStore::new().with_quota(1));
        let (cache, clock) = cache_with(CacheConfig::default(), store);
        cache.set("stale", &1, Some(Duration::from_secs(1))).unwrap();
        let changes = cache.subscribe();
        clock.advance(Duration::from_secs(2));

        // Quota failure purges the stale entry inside the persistence run
        cache.persist();
        assert!(cache.is_empty());
        assert!(!changes.has_changed().unwrap());

        cache.set("k", &1, None).unwrap();
        assert!(changes.has_changed().unwrap());
    }

    #[test]
    fn test_writes_during_persist_still_notify() {
        let (store, entered, release) = store::GatedStore::new();
        let store = Arc::new(store);
        let cache = TtlCache::new(
            CacheConfig::default(),
            store.clone(),
            Arc::new(ManualClock::new(T0)),
        );
        cache.set("before", &0, None).unwrap();

        let persisting = {
            let cache = cache.clone();
            std::thread::spawn(move || cache.persist())
        };
        entered.recv().unwrap();

        let changes = cache.subscribe();
        cache.set("during", &1, None).unwrap();
        assert!(changes.has_changed().unwrap());
        assert!(cache.delete("before"));
        assert!(changes.has_changed().unwrap());

        release.send(()).unwrap();
        persisting.join().unwrap();
        assert!(store.snapshot().is_some());
    }

    #[test]
    fn test_eviction_tie_goes_to_first_inserted() {
        let (cache, _) = cache_with(
            CacheConfig::default().with_max_size(3),
            Arc::new(MemorySnapshotStore::new()),
        );
        // Same timestamp for every write
        for key in ["z", "a", "m"] {
            cache.set(key, &key, None).unwrap();
        }
        // Overwriting keeps the original position
        cache.set("z", &"z2", None).unwrap();

        cache.set("n", &"n", None).unwrap();
        assert!(!cache.has("z"));
        assert!(cache.has("a") && cache.has("m") && cache.has("n"));

        cache.set("o", &"o", None).unwrap();
        assert!(!cache.has("a"));
    }

    #[test]
    fn test_reload_keeps_insertion_order() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (cache, _) = cache_with(CacheConfig::default().with_max_size(2), store.clone());
        cache.set("y", &1, None).unwrap();
        cache.set("b", &2, None).unwrap();
        cache.persist();

        let (reloaded, _) = cache_with(CacheConfig::default().with_max_size(2), store);
        reloaded.set("c", &3, None).unwrap();
        assert!(!reloaded.has("y"));
        assert!(reloaded.has("b") && reloaded.has("c"));
    }

    #[test]
    fn test_disabled_persistence_writes_nothing() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (cache, _) = cache_with(CacheConfig::default().with_persistence(false), store.clone());
        cache.set("k", &1, None).unwrap();
        cache.persist();
        assert!(store.snapshot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_fetch() {
        let (cache, _) = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = || {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ClientError>(vec![1, 2, 3])
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch::<Vec<i32>, _, _>("k", None, fetch()),
            cache.get_or_fetch::<Vec<i32>, _, _>("k", None, fetch()),
        );
        assert_eq!(a.unwrap(), vec![1, 2, 3]);
        assert_eq!(b.unwrap(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Now cached
        let c = cache
            .get_or_fetch::<Vec<i32>, _, _>("k", None, fetch())
            .await
            .unwrap();
        assert_eq!(c, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_is_shared_and_not_cached() {
        let (cache, _) = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = || {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<i32, _>(ClientError::Unauthenticated)
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch::<i32, _, _>("k", None, failing()),
            cache.get_or_fetch::<i32, _, _>("k", None, failing()),
        );
        assert!(a.is_err() && b.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.has("k"));

        let _ = cache.get_or_fetch::<i32, _, _>("k", None, failing()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
