//! Response cache with TTL expiry and LRU eviction.
//!
//! Entries move through `absent -> present -> expired -> absent`. An expired
//! entry is invisible to readers straight away; it is physically removed on
//! the next read of its key or by the periodic sweep, whichever comes first.
//!
//! The sweep is a tokio interval task holding only a weak reference to the
//! cache, so it stops on its own once the last [`CacheEngine`] handle is
//! dropped.

use crate::models::NormalizedResponse;
use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// Longest TTL an entry can have; longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

/// How the dispatcher consults the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Serve from cache only; a miss is an error
    CacheOnly,
    /// Always go to the network; never read or write the cache
    NetworkOnly,
    /// Serve from cache when present, otherwise fetch and store
    #[default]
    CacheFirst,
    /// Fetch and store; fall back to the cache when the fetch fails
    NetworkFirst,
    /// Always fetch; never read or write the cache
    NoCache,
}

impl CacheStrategy {
    /// Whether this strategy looks up the cache before the network.
    pub fn reads_before_network(&self) -> bool {
        matches!(self, CacheStrategy::CacheOnly | CacheStrategy::CacheFirst)
    }

    /// Whether successful network responses are stored.
    pub fn writes(&self) -> bool {
        matches!(self, CacheStrategy::CacheFirst | CacheStrategy::NetworkFirst)
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheStrategy::CacheOnly => "cache-only",
            CacheStrategy::NetworkOnly => "network-only",
            CacheStrategy::CacheFirst => "cache-first",
            CacheStrategy::NetworkFirst => "network-first",
            CacheStrategy::NoCache => "no-cache",
        };
        write!(f, "{}", name)
    }
}

/// Cache sizing and timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 200,
            default_ttl: Duration::from_millis(300_000),
            cleanup_interval: Duration::from_millis(120_000),
        }
    }
}

/// A cached response and its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: NormalizedResponse,
    pub created_at: Instant,
    pub ttl: Duration,
    pub expire_at: Instant,
    pub access_count: u64,
    pub last_access_at: Instant,
    // Monotonic access order; breaks ties between equal instants.
    access_tick: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expire_at
    }
}

/// Snapshot returned by [`CacheEngine::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_items: usize,
    pub max_size: usize,
    pub expired_items: usize,
    /// Human readable, e.g. `"1.5 KB"`
    pub estimated_size: String,
    pub estimated_bytes: u64,
    pub average_access_count: u64,
    pub hits: u64,
    pub misses: u64,
    /// Percentage of lookups that hit, rounded
    pub hit_rate: u64,
}

/// Outcome of one warmup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupResult {
    pub key: String,
    pub success: bool,
    pub error: Option<String>,
}

pub type WarmupError = Box<dyn std::error::Error + Send + Sync>;

/// An entry to pre-load into the cache.
pub struct WarmupRequest {
    pub key: String,
    pub ttl: Option<Duration>,
    pub fetcher: BoxFuture<'static, Result<NormalizedResponse, WarmupError>>,
}

impl fmt::Debug for WarmupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarmupRequest")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    tick: u64,
}

impl Entries {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

#[derive(Debug)]
struct Inner {
    config: CacheConfig,
    entries: Mutex<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Shared handle to the response cache. Clones refer to the same cache.
#[derive(Debug, Clone)]
pub struct CacheEngine {
    inner: Arc<Inner>,
}

impl Default for CacheEngine {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CacheEngine {
    /// Creates a cache and, when called inside a tokio runtime, starts the
    /// periodic sweep.
    pub fn new(config: CacheConfig) -> Self {
        let engine = Self {
            inner: Arc::new(Inner {
                config,
                entries: Mutex::new(Entries::default()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(sweep_loop(
                    Arc::downgrade(&engine.inner),
                    engine.inner.config.cleanup_interval,
                ));
            }
            Err(_) => log::debug!("No tokio runtime, cache sweep disabled"),
        }

        engine
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        match self.inner.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stores `value` under `key` for `ttl` (the default TTL when `None`).
    /// At capacity the least recently accessed entry is evicted first.
    pub fn set(&self, key: &str, value: NormalizedResponse, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.inner.config.default_ttl).min(MAX_TTL);
        let now = Instant::now();
        let mut entries = self.lock();

        if !entries.map.contains_key(key) && entries.map.len() >= self.inner.config.max_size {
            let lru = entries
                .map
                .values()
                .min_by_key(|entry| entry.access_tick)
                .map(|entry| entry.key.clone());
            if let Some(lru) = lru {
                entries.map.remove(&lru);
                log::debug!("Cache evicted least recently used entry {}", lru);
            }
        }

        let tick = entries.next_tick();
        entries.map.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                created_at: now,
                ttl,
                expire_at: now + ttl,
                access_count: 1,
                last_access_at: now,
                access_tick: tick,
            },
        );
        log::debug!("Cache set {} (ttl {}ms)", key, ttl.as_millis());
    }

    /// Looks up `key`. Expired entries are removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<NormalizedResponse> {
        let now = Instant::now();
        let mut entries = self.lock();

        let expired = match entries.map.get(key) {
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            entries.map.remove(key);
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
            log::debug!("Cache entry {} expired", key);
            return None;
        }

        let tick = entries.next_tick();
        let entry = entries.map.get_mut(key)?;
        entry.access_count += 1;
        entry.last_access_at = now;
        entry.access_tick = tick;
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        log::debug!("Cache hit {} (accessed {} times)", key, entry.access_count);
        Some(entry.value.clone())
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().map.remove(key).is_some()
    }

    /// Removes every entry and resets the hit/miss counters.
    pub fn clear(&self) {
        let mut entries = self.lock();
        let size = entries.map.len();
        entries.map.clear();
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);
        log::debug!("Cache cleared ({} entries)", size);
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        sweep_entries(&self.inner)
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.lock();

        let total_items = entries.map.len();
        let expired_items = entries
            .map
            .values()
            .filter(|entry| entry.is_expired(now))
            .count();
        let estimated_bytes: u64 = entries
            .map
            .values()
            .map(|entry| serde_json::to_vec(&entry.value).map_or(0, |bytes| bytes.len() as u64))
            .sum();
        let total_access: u64 = entries.map.values().map(|entry| entry.access_count).sum();
        let average_access_count = if total_items == 0 {
            0
        } else {
            (total_access as f64 / total_items as f64).round() as u64
        };
        drop(entries);

        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0
        } else {
            (hits as f64 * 100.0 / lookups as f64).round() as u64
        };

        CacheStats {
            total_items,
            max_size: self.inner.config.max_size,
            expired_items,
            estimated_size: format_bytes(estimated_bytes),
            estimated_bytes,
            average_access_count,
            hits,
            misses,
            hit_rate,
        }
    }

    /// Fetches every request concurrently and stores the successful ones.
    pub async fn warmup(&self, requests: Vec<WarmupRequest>) -> Vec<WarmupResult> {
        let total = requests.len();
        log::debug!("Warming up cache with {} requests", total);

        let results = join_all(requests.into_iter().map(|request| async move {
            let WarmupRequest { key, ttl, fetcher } = request;
            match fetcher.await {
                Ok(value) => {
                    self.set(&key, value, ttl);
                    WarmupResult {
                        key,
                        success: true,
                        error: None,
                    }
                }
                Err(e) => {
                    log::warn!("Cache warmup failed for {}: {}", key, e);
                    WarmupResult {
                        key,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            }
        }))
        .await;

        let successful = results.iter().filter(|result| result.success).count();
        log::debug!("Cache warmup complete {}/{}", successful, total);
        results
    }
}

fn sweep_entries(inner: &Inner) -> usize {
    let now = Instant::now();
    let mut entries = match inner.entries.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let before = entries.map.len();
    entries.map.retain(|_, entry| !entry.is_expired(now));
    let removed = before - entries.map.len();
    if removed > 0 {
        log::debug!("Cache sweep removed {} expired entries", removed);
    }
    removed
}

async fn sweep_loop(inner: Weak<Inner>, period: Duration) {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        match inner.upgrade() {
            Some(inner) => {
                sweep_entries(&inner);
            }
            None => break,
        }
    }
}

/// Formats a byte count, e.g. `1536` as `"1.5 KB"`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes = bytes as f64;
    let exponent = ((bytes.ln() / 1024f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = bytes / 1024f64.powi(exponent as i32);
    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[exponent])
}
