//! Content-addressed response cache for externally-billed model calls.
//!
//! Cache keys are [`Fingerprint`]s: a SHA-256 digest over the model
//! identifier and the fully rendered prompt. Entries expire by TTL
//! (`ttl = 0` means no expiry until evicted) and the in-memory table evicts
//! its least-recently-used entry when full. An optional durable mirror
//! persists entries as atomically-written JSON files so warm state survives
//! process restarts.
//!
//! Cumulative statistics (hits, misses, tokens saved, estimated monetary
//! savings) accumulate independently of the stored entries and can be reset
//! without clearing them.

pub mod durable;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use durable::DurableMirror;

/// Deterministic cache key over (model identifier, rendered prompt).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for a call.
    ///
    /// # Examples
    ///
    /// ```
    /// use turnloom::cache::Fingerprint;
    ///
    /// let a = Fingerprint::compute("mock-small", "hello");
    /// let b = Fingerprint::compute("mock-small", "hello");
    /// let c = Fingerprint::compute("mock-large", "hello");
    /// assert_eq!(a, b);
    /// assert_ne!(a, c);
    /// ```
    #[must_use]
    pub fn compute(model: &str, prompt: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(prompt.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hex digest form, used as the durable mirror's file stem.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A cached model response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Model that produced the response.
    pub model: String,
    /// Generated text.
    pub text: String,
    /// Prompt tokens of the original call.
    pub input_tokens: u64,
    /// Completion tokens of the original call.
    pub output_tokens: u64,
    /// Cost of the original call, used to estimate savings on a hit.
    pub unit_cost: f64,
}

/// Cache behavior knobs.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Master switch; a disabled cache misses everything and stores nothing.
    pub enabled: bool,
    /// Maximum in-memory entries before LRU eviction.
    pub max_entries: usize,
    /// Entry time-to-live. Zero means entries never expire (until evicted).
    pub ttl: Duration,
    /// Durable mirror directory; `None` keeps the cache memory-only.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1024,
            ttl: Duration::ZERO,
            dir: None,
        }
    }
}

impl CacheConfig {
    /// Resolve cache controls from the environment (via dotenvy):
    ///
    /// - `TURNLOOM_CACHE`: `0`/`false` disables the cache
    /// - `TURNLOOM_CACHE_DIR`: durable mirror directory
    /// - `TURNLOOM_CACHE_TTL_SECS`: entry TTL in seconds (0 = no expiry)
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("TURNLOOM_CACHE") {
            config.enabled = !matches!(raw.trim(), "0" | "false" | "off");
        }
        if let Ok(dir) = std::env::var("TURNLOOM_CACHE_DIR") {
            if !dir.trim().is_empty() {
                config.dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(raw) = std::env::var("TURNLOOM_CACHE_TTL_SECS") {
            if let Ok(secs) = raw.trim().parse::<u64>() {
                config.ttl = Duration::from_secs(secs);
            }
        }
        config
    }
}

/// Cumulative cache statistics, resettable without touching stored entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that fell through (including bypassed and expired lookups).
    pub misses: u64,
    /// Tokens avoided by hits (input + output of the original calls).
    pub tokens_saved: u64,
    /// Estimated monetary savings from hits.
    pub cost_saved: f64,
}

struct Entry {
    response: CachedResponse,
    inserted_at: DateTime<Utc>,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    entries: FxHashMap<String, Entry>,
    tick: u64,
}

/// Thread-safe content-addressed cache with TTL, LRU eviction, bypass, and
/// an optional durable mirror.
///
/// # Examples
///
/// ```
/// use turnloom::cache::{CacheConfig, CachedResponse, Fingerprint, ResponseCache};
///
/// let cache = ResponseCache::new(CacheConfig::default());
/// let fp = Fingerprint::compute("mock-small", "prompt");
///
/// assert!(cache.get(&fp, false).is_none());
/// cache.put(&fp, CachedResponse {
///     model: "mock-small".into(),
///     text: "answer".into(),
///     input_tokens: 12,
///     output_tokens: 3,
///     unit_cost: 0.0009,
/// });
///
/// let hit = cache.get(&fp, false).expect("hit");
/// assert_eq!(hit.text, "answer");
///
/// // A bypassed lookup is forced to miss even though the entry exists.
/// assert!(cache.get(&fp, true).is_none());
///
/// let stats = cache.stats();
/// assert_eq!((stats.hits, stats.misses), (1, 2));
/// ```
pub struct ResponseCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
    stats: Mutex<CacheStats>,
    mirror: Option<DurableMirror>,
}

impl ResponseCache {
    /// Create a cache, rehydrating non-expired entries from the durable
    /// mirror when one is configured.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let mirror = config
            .dir
            .as_ref()
            .filter(|_| config.enabled)
            .and_then(|dir| match DurableMirror::open(dir) {
                Ok(mirror) => Some(mirror),
                Err(error) => {
                    tracing::warn!(%error, "cache mirror unavailable; continuing memory-only");
                    None
                }
            });

        let cache = Self {
            config,
            inner: Mutex::new(Inner::default()),
            stats: Mutex::new(CacheStats::default()),
            mirror,
        };
        cache.rehydrate();
        cache
    }

    /// Create a cache from environment-resolved configuration.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(CacheConfig::from_env())
    }

    fn rehydrate(&self) {
        let Some(mirror) = &self.mirror else { return };
        let now = Utc::now();
        let mut inner = self.inner.lock();
        for (key, response, inserted_at) in mirror.load_all() {
            if self.is_expired(inserted_at, now) {
                mirror.remove(&key);
                continue;
            }
            if inner.entries.len() >= self.config.max_entries {
                break;
            }
            inner.tick += 1;
            let tick = inner.tick;
            inner.entries.insert(
                key,
                Entry {
                    response,
                    inserted_at,
                    last_used: tick,
                },
            );
        }
    }

    fn is_expired(&self, inserted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.config.ttl.is_zero() {
            return false;
        }
        let age = now.signed_duration_since(inserted_at);
        age >= chrono::Duration::from_std(self.config.ttl).unwrap_or(chrono::Duration::MAX)
    }

    /// Look up a fingerprint.
    ///
    /// A hit requires the entry to exist and to be within its TTL. When
    /// `bypass` is set, the lookup is forced to miss even on a matching
    /// entry (the entry itself is untouched).
    pub fn get(&self, fingerprint: &Fingerprint, bypass: bool) -> Option<CachedResponse> {
        if !self.config.enabled {
            return None;
        }
        if bypass {
            self.stats.lock().misses += 1;
            return None;
        }

        let now = Utc::now();
        let mut inner = self.inner.lock();
        let expired = matches!(
            inner.entries.get(fingerprint.as_str()),
            Some(entry) if self.is_expired(entry.inserted_at, now)
        );
        if expired {
            inner.entries.remove(fingerprint.as_str());
            if let Some(mirror) = &self.mirror {
                mirror.remove(fingerprint.as_str());
            }
        }

        inner.tick += 1;
        let tick = inner.tick;
        let found = inner.entries.get_mut(fingerprint.as_str()).map(|entry| {
            entry.last_used = tick;
            entry.response.clone()
        });
        drop(inner);

        match found {
            Some(response) => {
                let mut stats = self.stats.lock();
                stats.hits += 1;
                stats.tokens_saved += response.input_tokens + response.output_tokens;
                stats.cost_saved += response.unit_cost;
                Some(response)
            }
            None => {
                self.stats.lock().misses += 1;
                None
            }
        }
    }

    /// Insert a response, evicting the least-recently-used entry first when
    /// the table is at capacity.
    pub fn put(&self, fingerprint: &Fingerprint, response: CachedResponse) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }

        let inserted_at = Utc::now();
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(fingerprint.as_str())
            && inner.entries.len() >= self.config.max_entries
        {
            let evicted = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(key) = evicted {
                inner.entries.remove(&key);
                if let Some(mirror) = &self.mirror {
                    mirror.remove(&key);
                }
            }
        }

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            fingerprint.as_str().to_string(),
            Entry {
                response: response.clone(),
                inserted_at,
                last_used: tick,
            },
        );
        drop(inner);

        if let Some(mirror) = &self.mirror {
            if let Err(error) = mirror.store(fingerprint.as_str(), &response, inserted_at) {
                tracing::warn!(%error, "failed to mirror cache entry");
            }
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the table currently holds the fingerprint (ignores TTL).
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.lock().entries.contains_key(fingerprint.as_str())
    }

    /// Snapshot of the cumulative statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Reset the statistics without clearing any stored entries.
    pub fn reset_stats(&self) {
        *self.stats.lock() = CacheStats::default();
    }
}
