//! In-memory TTL cache with LRU bounding and prefix invalidation.
//!
//! One cache is shared across all facades; keys are namespaced by purpose
//! tag and connector instance id so entries cannot collide across
//! instances. Operations never block: the interior mutex is only held for
//! map manipulation and is never held across an await point.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default capacity of the shared cache.
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Default entry TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

/// Bounded LRU cache with per-entry TTL.
#[derive(Debug)]
pub struct TtlCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    default_ttl: Duration,
}

impl TtlCache {
    /// Create a cache with the given capacity and default TTL.
    #[must_use]
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
            default_ttl,
        }
    }

    /// Create a cache with the process defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Get a value, if present and not expired. Refreshes recency.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.tick += 1;
        let tick = inner.tick;

        match inner.entries.get_mut(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.last_used = tick;
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store a value with a per-entry TTL override.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let key = key.into();
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.tick += 1;
        let tick = inner.tick;

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                last_used: tick,
            },
        );

        if inner.entries.len() > self.capacity {
            let now = Instant::now();
            inner.entries.retain(|_, e| e.expires_at > now);
        }
        while inner.entries.len() > self.capacity {
            // Still over after the expiry sweep: evict the LRU entry.
            if let Some(lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&lru_key);
            } else {
                break;
            }
        }
    }

    /// Remove exactly one key. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.entries.remove(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix` at a part
    /// boundary. Returns the number of removed entries.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let boundary = format!("{prefix}|");
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = inner.entries.len();
        inner
            .entries
            .retain(|k, _| k != prefix && !k.starts_with(&boundary));
        before - inner.entries.len()
    }

    /// All keys currently stored, including expired-but-unswept ones.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.entries.keys().cloned().collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder for canonical cache keys.
///
/// Each part is JSON-encoded and parts are joined by `|`; the first part
/// is the purpose tag and the second the connector instance id. JSON
/// encoding keeps the key locale-independent and unambiguous.
#[derive(Debug, Clone)]
pub struct CacheKey {
    parts: Vec<String>,
}

impl CacheKey {
    /// Start a key with its purpose tag.
    #[must_use]
    pub fn new(purpose: &str) -> Self {
        let mut key = Self { parts: Vec::new() };
        key.push_part(purpose);
        key
    }

    /// Append a part.
    #[must_use]
    pub fn part<T: Serialize>(mut self, value: &T) -> Self {
        self.push_part(value);
        self
    }

    /// Render the key (or prefix) string.
    #[must_use]
    pub fn build(&self) -> String {
        self.parts.join("|")
    }

    fn push_part<T: Serialize + ?Sized>(&mut self, value: &T) {
        let encoded = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        self.parts.push(encoded);
    }
}
