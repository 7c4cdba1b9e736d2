//! Routing result cache.
//!
//! Capacity-bounded LRU keyed by the verbatim (case-sensitive) input. Entries
//! produced by the rule and history layers use a short TTL since they are
//! cheap to recompute; LLM results use a long TTL.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::types::{clamp_confidence, ClassificationSource, Intent};
use crate::util::truncate;

/// Configuration for [`RouterCache`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries (default: 500).
    pub capacity: usize,
    /// TTL for rule/history results (default: 5 minutes).
    pub default_ttl: Duration,
    /// TTL for LLM results (default: 30 minutes).
    pub llm_result_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            default_ttl: Duration::from_secs(5 * 60),
            llm_result_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// A cached routing decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheHit {
    pub intent: Intent,
    pub confidence: f32,
    /// Layer that originally produced the entry.
    pub source: ClassificationSource,
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    intent: Intent,
    confidence: f32,
    source: ClassificationSource,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    stats_since: Instant,
}

impl CacheState {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }
}

/// LRU cache of routing decisions with source-dependent TTLs.
pub struct RouterCache {
    state: Mutex<CacheState>,
    default_ttl: Duration,
    llm_result_ttl: Duration,
}

impl RouterCache {
    /// Create a cache. Zero values in `config` fall back to the defaults.
    pub fn new(config: CacheConfig) -> Self {
        let defaults = CacheConfig::default();
        let capacity = NonZeroUsize::new(config.capacity)
            .or_else(|| NonZeroUsize::new(defaults.capacity))
            .unwrap_or(NonZeroUsize::MIN);
        let default_ttl = if config.default_ttl.is_zero() {
            defaults.default_ttl
        } else {
            config.default_ttl
        };
        let llm_result_ttl = if config.llm_result_ttl.is_zero() {
            defaults.llm_result_ttl
        } else {
            config.llm_result_ttl
        };

        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                stats_since: Instant::now(),
            }),
            default_ttl,
            llm_result_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stable key for an input. The input is hashed verbatim.
    fn key(input: &str) -> String {
        let digest = Sha256::digest(input.as_bytes());
        format!("route:{}", hex::encode(&digest[..8]))
    }

    /// TTL applied to entries from `source`.
    pub fn ttl_for(&self, source: ClassificationSource) -> Duration {
        match source {
            ClassificationSource::Llm => self.llm_result_ttl,
            _ => self.default_ttl,
        }
    }

    /// Look up a cached decision. Expired entries are dropped and count as misses.
    pub fn get(&self, input: &str) -> Option<CacheHit> {
        let key = Self::key(input);
        let now = Instant::now();
        let mut state = self.lock();

        let cached = state.entries.get(&key).map(|entry| {
            let hit = CacheHit {
                intent: entry.intent,
                confidence: entry.confidence,
                source: entry.source,
            };
            (hit, entry.is_expired(now))
        });
        let hit = match cached {
            Some((hit, false)) => hit,
            Some((_, true)) => {
                state.entries.pop(&key);
                state.misses += 1;
                return None;
            }
            None => {
                state.misses += 1;
                return None;
            }
        };
        state.hits += 1;
        drop(state);

        debug!(
            input = %truncate(input, 50),
            intent = %hit.intent,
            source = %hit.source,
            "router cache hit"
        );
        Some(hit)
    }

    /// Store a decision. The TTL is chosen from `source`.
    ///
    /// When full, expired entries are purged before the least recently used
    /// live entry is evicted.
    pub fn set(&self, input: &str, intent: Intent, confidence: f32, source: ClassificationSource) {
        let key = Self::key(input);
        let ttl = self.ttl_for(source);
        let now = Instant::now();
        let mut state = self.lock();

        if !state.entries.contains(&key) && state.entries.len() >= state.entries.cap().get() {
            state.purge_expired(now);
        }
        state.entries.put(
            key,
            CacheEntry {
                intent,
                confidence: clamp_confidence(confidence),
                source,
                inserted_at: now,
                ttl,
            },
        );
        drop(state);

        debug!(
            input = %truncate(input, 50),
            intent = %intent,
            source = %source,
            ttl_secs = ttl.as_secs(),
            "router cache set"
        );
    }

    /// Remove the entry for `input`, if any.
    pub fn invalidate(&self, input: &str) -> bool {
        let key = Self::key(input);
        self.lock().entries.pop(&key).is_some()
    }

    /// Remove all entries and reset statistics.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
        state.stats_since = Instant::now();
    }

    /// Drop expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    /// Reset hit/miss counters without touching entries.
    pub fn reset_stats(&self) {
        let mut state = self.lock();
        state.hits = 0;
        state.misses = 0;
        state.stats_since = Instant::now();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let total = state.hits + state.misses;
        let hit_rate = if total > 0 {
            state.hits as f64 / total as f64
        } else {
            0.0
        };
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            size: state.entries.len(),
            capacity: state.entries.cap().get(),
            uptime_secs: state.stats_since.elapsed().as_secs(),
        }
    }
}
