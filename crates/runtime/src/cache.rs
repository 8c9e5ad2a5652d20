//! In-memory response cache keyed by request fingerprint.
//!
//! Entries expire lazily: a read that finds an expired entry removes it and
//! reports a miss. Reads never extend an entry's lifetime.

use dashmap::DashMap;
use querydeck_common::config::ResultCacheConfig;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Time source for expiry decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    max_entries: Option<usize>,
}

impl ResultCache {
    pub fn new(config: &ResultCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &ResultCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            default_ttl: Duration::from_secs(config.ttl_seconds),
            max_entries: config.max_entries,
        }
    }

    /// Returns the stored value while `now < expiry`.
    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        let now = self.clock.now();
        match self.entries.get(fingerprint) {
            None => return None,
            Some(entry) if now < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => {}
        }

        // Only remove if still expired; a concurrent put may have refreshed it.
        if self
            .entries
            .remove_if(fingerprint, |_, entry| now >= entry.expires_at)
            .is_some()
        {
            debug!(target: "cache", fingerprint = %fingerprint, "Expired result removed");
        }
        None
    }

    /// Stores `value`, replacing any entry for the same fingerprint. `ttl`
    /// defaults to the configured lifetime.
    pub fn put(&self, fingerprint: String, value: Value, ttl: Option<Duration>) {
        let expires_at = self.clock.now() + ttl.unwrap_or(self.default_ttl);

        if let Some(max) = self.max_entries {
            if max == 0 {
                return;
            }
            if !self.entries.contains_key(&fingerprint) && self.entries.len() >= max {
                self.purge_expired();
                if self.entries.len() >= max {
                    self.evict_nearest_expiry();
                }
            }
        }

        self.entries
            .insert(fingerprint, CacheEntry { value, expires_at });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn evict_nearest_expiry(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
            debug!(target: "cache", fingerprint = %key, "Evicted result to stay within capacity");
        }
    }
}
