//! Tiered in-memory TTL cache.
//!
//! Three layers with different default TTLs: `hot` (5 minutes) for
//! error reports, `warm` (45 minutes) for lineage payloads, `cold`
//! (24 hours) for anything long-lived. Values are opaque bytes.
//!
//! Statistics discipline: per-key counters live exactly as long as the
//! entry they describe. `get` on an expired entry removes the entry and
//! its statistics in the same critical section and is accounted as a
//! miss on the aggregate counters, which survive entry removal and feed
//! the hit-rate. Invariant: `|stats| <= |entries|` at every observable
//! moment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Cache layer tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayer {
    /// Short-lived request payloads (5 minutes).
    Hot,
    /// Computed lineage views (45 minutes).
    Warm,
    /// Long-lived derived data (24 hours).
    Cold,
}

impl CacheLayer {
    /// Default TTL for entries in this layer.
    #[must_use]
    pub fn default_ttl(self) -> Duration {
        match self {
            Self::Hot => Duration::from_secs(5 * 60),
            Self::Warm => Duration::from_secs(45 * 60),
            Self::Cold => Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Canonical lowercase spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }

    /// Parses a query-parameter spelling.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "hot" => Some(Self::Hot),
            "warm" => Some(Self::Warm),
            "cold" => Some(Self::Cold),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Arc<Vec<u8>>,
    inserted_at: Instant,
    ttl: Duration,
    layer: CacheLayer,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

#[derive(Debug, Default)]
struct KeyStats {
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Per-key statistics snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct KeyStatsSnapshot {
    /// Number of fresh-entry reads.
    pub hits: u64,
    /// Number of misses recorded against this key while it lived.
    pub misses: u64,
    /// Number of layer-invalidation evictions.
    pub evictions: u64,
}

/// Aggregate counters that survive entry removal.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AggregateStats {
    /// Total cache hits.
    pub hits: u64,
    /// Total cache misses (absent or expired).
    pub misses: u64,
    /// Entries removed by layer invalidation.
    pub evictions: u64,
    /// Entries removed by TTL expiry.
    pub expirations: u64,
    /// `hits / (hits + misses)`, zero when no reads happened.
    pub hit_rate: f64,
}

/// One entry in the debug listing.
#[derive(Debug, Clone, Serialize)]
pub struct EntryDebug {
    /// Cache key.
    pub key: String,
    /// Layer tag.
    pub layer: CacheLayer,
    /// Seconds since insertion.
    pub age_secs: u64,
    /// Configured TTL in seconds.
    pub ttl_secs: u64,
    /// Seconds until expiry (zero when already due).
    pub expires_in_secs: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    stats: HashMap<String, KeyStats>,
}

/// Key→bytes store with hot/warm/cold TTL layers and per-key statistics.
#[derive(Debug, Default)]
pub struct TieredCache {
    inner: RwLock<Inner>,
    agg_hits: AtomicU64,
    agg_misses: AtomicU64,
    agg_evictions: AtomicU64,
    agg_expirations: AtomicU64,
}

impl TieredCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a key. An expired entry is removed together with its
    /// statistics and the lookup is accounted as a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let now = Instant::now();

        // Fast path under the read lock: fresh hit or definite absence.
        // `None` here means the entry exists but is expired.
        let fast = {
            let inner = self.inner.read().expect("cache lock");
            match inner.entries.get(key) {
                Some(entry) if !entry.is_expired(now) => Some(Some(Arc::clone(&entry.value))),
                Some(_) => None,
                None => Some(None),
            }
        };
        match fast {
            Some(Some(value)) => {
                self.agg_hits.fetch_add(1, Ordering::Relaxed);
                self.bump_key_hit(key);
                return Some(value);
            }
            Some(None) => {
                self.agg_misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            None => {}
        }

        // Expired: upgrade to the write lock and re-check, since another
        // request may have removed or replaced the entry meanwhile.
        let mut inner = self.inner.write().expect("cache lock");
        let live_value = match inner.entries.get(key) {
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => Some(Arc::clone(&entry.value)),
            None => {
                self.agg_misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if let Some(value) = live_value {
            self.agg_hits.fetch_add(1, Ordering::Relaxed);
            if let Some(stats) = inner.stats.get_mut(key) {
                stats.hits += 1;
            }
            return Some(value);
        }

        inner.entries.remove(key);
        inner.stats.remove(key);
        self.agg_expirations.fetch_add(1, Ordering::Relaxed);
        self.agg_misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "cache entry expired");
        None
    }

    fn bump_key_hit(&self, key: &str) {
        let mut inner = self.inner.write().expect("cache lock");
        if let Some(stats) = inner.stats.get_mut(key) {
            stats.hits += 1;
        }
    }

    /// Inserts a value into the given layer. A custom TTL overrides the
    /// layer default.
    pub fn set(&self, key: impl Into<String>, value: Vec<u8>, layer: CacheLayer, ttl: Option<Duration>) {
        let key = key.into();
        let mut inner = self.inner.write().expect("cache lock");
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value: Arc::new(value),
                inserted_at: Instant::now(),
                ttl: ttl.unwrap_or_else(|| layer.default_ttl()),
                layer,
            },
        );
        inner.stats.entry(key).or_default();
    }

    /// Removes a key and its statistics. Returns true when an entry was
    /// present.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.write().expect("cache lock");
        let removed = inner.entries.remove(key).is_some();
        inner.stats.remove(key);
        removed
    }

    /// Removes every entry and every statistics record. Returns the
    /// number of entries removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.write().expect("cache lock");
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.stats.clear();
        tracing::info!(removed, "cache cleared");
        removed
    }

    /// Removes all entries with the matching layer tag. Each eviction is
    /// counted on the key's statistics before the record is deleted; the
    /// per-key counter change is observable only through the aggregate
    /// log line, since statistics do not outlive their entry.
    pub fn invalidate_layer(&self, layer: CacheLayer) -> usize {
        let mut inner = self.inner.write().expect("cache lock");
        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.layer == layer)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            if let Some(stats) = inner.stats.get_mut(key) {
                stats.evictions += 1;
            }
            inner.entries.remove(key);
            inner.stats.remove(key);
        }

        let count = keys.len();
        self.agg_evictions
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::info!(layer = layer.as_str(), evicted = count, "cache layer invalidated");
        count
    }

    /// Removes all entries whose key starts with `prefix`. Used for
    /// node-scoped invalidation of composed cache keys.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.write().expect("cache lock");
        let keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            inner.entries.remove(key);
            inner.stats.remove(key);
        }
        self.agg_evictions
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
        keys.len()
    }

    /// Per-key statistics for one key, when its entry is alive.
    #[must_use]
    pub fn stats_for(&self, key: &str) -> Option<KeyStatsSnapshot> {
        let inner = self.inner.read().expect("cache lock");
        inner.stats.get(key).map(|s| KeyStatsSnapshot {
            hits: s.hits,
            misses: s.misses,
            evictions: s.evictions,
        })
    }

    /// Statistics for every live key.
    #[must_use]
    pub fn stats_all(&self) -> HashMap<String, KeyStatsSnapshot> {
        let inner = self.inner.read().expect("cache lock");
        inner
            .stats
            .iter()
            .map(|(key, s)| {
                (
                    key.clone(),
                    KeyStatsSnapshot {
                        hits: s.hits,
                        misses: s.misses,
                        evictions: s.evictions,
                    },
                )
            })
            .collect()
    }

    /// Aggregate counters and hit-rate.
    #[must_use]
    pub fn aggregate(&self) -> AggregateStats {
        let hits = self.agg_hits.load(Ordering::Relaxed);
        let misses = self.agg_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        AggregateStats {
            hits,
            misses,
            evictions: self.agg_evictions.load(Ordering::Relaxed),
            expirations: self.agg_expirations.load(Ordering::Relaxed),
            hit_rate,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("cache lock").entries.len()
    }

    /// True when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry counts per layer (hot, warm, cold).
    #[must_use]
    pub fn count_by_layer(&self) -> (usize, usize, usize) {
        let inner = self.inner.read().expect("cache lock");
        let mut counts = (0, 0, 0);
        for entry in inner.entries.values() {
            match entry.layer {
                CacheLayer::Hot => counts.0 += 1,
                CacheLayer::Warm => counts.1 += 1,
                CacheLayer::Cold => counts.2 += 1,
            }
        }
        counts
    }

    /// Debug listing of all entries, optionally filtered by layer.
    #[must_use]
    pub fn debug_info(&self, layer: Option<CacheLayer>) -> Vec<EntryDebug> {
        let now = Instant::now();
        let inner = self.inner.read().expect("cache lock");
        let mut listing: Vec<EntryDebug> = inner
            .entries
            .iter()
            .filter(|(_, entry)| layer.is_none_or(|wanted| entry.layer == wanted))
            .map(|(key, entry)| {
                let age = now.duration_since(entry.inserted_at);
                EntryDebug {
                    key: key.clone(),
                    layer: entry.layer,
                    age_secs: age.as_secs(),
                    ttl_secs: entry.ttl.as_secs(),
                    expires_in_secs: entry.ttl.saturating_sub(age).as_secs(),
                }
            })
            .collect();
        listing.sort_by(|a, b| a.key.cmp(&b.key));
        listing
    }
}
