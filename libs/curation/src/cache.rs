//! TTL cache in front of release-scoped translation lookups
//!
//! Keys are `release|direction|identifier`, lowercased. Entries older than the TTL
//! are evicted when read and count as misses. Capacity is bounded by an LRU.
//! Refreshing a release under the same version does not invalidate entries.

use crate::metrics;
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

/// Unicode case folding shared by cache keys and lookup matching.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Case-insensitive text equality under [`fold_case`].
pub fn same_text(a: &str, b: &str) -> bool {
    a == b || fold_case(a) == fold_case(b)
}

/// Build the cache key for a lookup.
pub fn cache_key(release: Option<&str>, direction: Direction, identifier: &str) -> String {
    fold_case(&format!(
        "{}|{}|{}",
        release.unwrap_or("none"),
        direction.as_str(),
        identifier
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// 0.0 before the first lookup.
    pub hit_ratio: f64,
    pub entries: usize,
}

struct CacheEntry<V> {
    stored_at: Instant,
    value: V,
}

pub struct TranslationCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TranslationCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::with_clock(ttl, max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let lookup = entries.get(key).map(|entry| {
            let fresh = now.saturating_duration_since(entry.stored_at) <= self.ttl;
            (fresh, entry.value.clone())
        });

        match lookup {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::TRANSLATION_CACHE_LOOKUPS_TOTAL
                    .with_label_values(&["miss"])
                    .inc();
                None
            }
            Some((true, value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::TRANSLATION_CACHE_LOOKUPS_TOTAL
                    .with_label_values(&["hit"])
                    .inc();
                Some(value)
            }
            Some((false, _)) => {
                entries.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::TRANSLATION_CACHE_LOOKUPS_TOTAL
                    .with_label_values(&["expired"])
                    .inc();
                None
            }
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let stored_at = self.clock.now();
        self.lock().put(key.into(), CacheEntry { stored_at, value });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            entries: self.len(),
        }
    }
}
