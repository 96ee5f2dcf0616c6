//! Memoized authorization decisions
//!
//! Decisions are keyed by the full `(principal, item, params digest,
//! anonymous)` tuple, so a lookup can only ever return a decision computed for
//! exactly the same inputs. The cache is owned by one engine and cleared on
//! every committed mutation.

use crate::types::Params;
use blake3::Hasher;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub capacity: usize,

    /// Time-to-live for cached decisions; `None` keeps them until the next
    /// mutation
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: None,
        }
    }
}

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    principal: String,
    item: String,
    params: [u8; 32],
    anonymous: bool,
}

impl DecisionKey {
    pub fn new(principal: &str, item: &str, params: &Params, anonymous: bool) -> Self {
        Self {
            principal: principal.to_string(),
            item: item.to_string(),
            params: params_digest(params),
            anonymous,
        }
    }
}

/// Cached entry with TTL
#[derive(Debug, Clone, Copy)]
struct CachedEntry {
    allowed: bool,
    cached_at: Instant,
}

impl CachedEntry {
    fn new(allowed: bool) -> Self {
        Self {
            allowed,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.map(|ttl| self.cached_at.elapsed() > ttl)
            .unwrap_or(false)
    }
}

/// Per-engine decision cache
///
/// Every [`clear`](Self::clear) bumps a generation counter under its write
/// lock. [`put`](Self::put) compares and inserts under the read lock, so a
/// decision computed against an older generation is never stored, and a check
/// racing with a mutation can never leave a stale decision behind.
pub struct DecisionCache {
    entries: DashMap<DecisionKey, CachedEntry>,
    config: CacheConfig,
    generation: RwLock<u64>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    expirations: AtomicUsize,
}

impl DecisionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            generation: RwLock::new(0),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            expirations: AtomicUsize::new(0),
        }
    }

    /// Current generation; read it before reading the snapshot a decision is
    /// computed from
    pub fn generation(&self) -> u64 {
        *self.generation.read()
    }

    pub fn get(&self, key: &DecisionKey) -> Option<bool> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(self.config.ttl) {
                drop(entry);
                self.entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.allowed);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a decision computed under `generation`
    ///
    /// Dropped if a [`clear`](Self::clear) happened since `generation` was
    /// read.
    pub fn put(&self, generation: u64, key: DecisionKey, allowed: bool) {
        if self.config.capacity == 0 {
            return;
        }

        let current = self.generation.read();
        if *current != generation {
            return;
        }
        if self.entries.len() >= self.config.capacity {
            self.evict_oldest();
        }
        self.entries.insert(key, CachedEntry::new(allowed));
    }

    /// Drop every memoized decision
    pub fn clear(&self) {
        let mut generation = self.generation.write();
        *generation += 1;
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.entries.len(),
            max_entries: self.config.capacity,
        }
    }

    /// Evict up to 10% of entries, oldest first
    fn evict_oldest(&self) {
        let to_remove = (self.config.capacity / 10).max(1);

        let mut ages: Vec<(DecisionKey, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().cached_at))
            .collect();
        ages.sort_by_key(|(_, cached_at)| *cached_at);

        for (key, _) in ages.into_iter().take(to_remove) {
            self.entries.remove(&key);
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// BLAKE3 digest of a parameter bag, independent of key insertion order
pub fn params_digest(params: &Params) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hash_object(&mut hasher, params);
    *hasher.finalize().as_bytes()
}

fn hash_object(hasher: &mut Hasher, object: &Params) {
    let mut keys: Vec<&String> = object.keys().collect();
    keys.sort();

    hasher.update(b"{");
    hasher.update(&(keys.len() as u64).to_le_bytes());
    for key in keys {
        hash_str(hasher, key);
        if let Some(value) = object.get(key) {
            hash_value(hasher, value);
        }
    }
}

fn hash_value(hasher: &mut Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(b"n");
        }
        Value::Bool(b) => {
            hasher.update(if *b { b"t" } else { b"f" });
        }
        Value::Number(n) => {
            hasher.update(b"#");
            hash_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update(b"s");
            hash_str(hasher, s);
        }
        Value::Array(values) => {
            hasher.update(b"[");
            hasher.update(&(values.len() as u64).to_le_bytes());
            for value in values {
                hash_value(hasher, value);
            }
        }
        Value::Object(object) => hash_object(hasher, object),
    }
}

/// Length-prefixed so adjacent strings cannot run together
fn hash_str(hasher: &mut Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}
