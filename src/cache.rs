//! Bounded LRU fallback cache with per-entry TTL.
//!
//! Expiry is deliberately soft: `get` returns entries past their TTL so a
//! failing upstream can still be served stale data. Hard removal only happens
//! through `delete`, `clear`, explicit `cleanup`, or LRU eviction.

use crate::clock::Clock;
use crate::config::{MAX_CACHE_SIZE, MAX_CACHE_TTL_MS, MIN_CACHE_SIZE, MIN_CACHE_TTL_MS};
use crate::error::{CacheError, ConfigError};
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    inserted_at_ms: u64,
    ttl_ms: u64,
}

impl CacheEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.inserted_at_ms.saturating_add(self.ttl_ms)
    }
}

/// LRU + TTL cache holding fallback responses for one service.
pub struct FallbackCache {
    service_name: String,
    entries: Mutex<LruCache<String, CacheEntry>>,
    default_ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl FallbackCache {
    pub fn new(
        service_name: &str,
        max_size: usize,
        default_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if service_name.trim().is_empty() {
            return Err(ConfigError::MissingServiceName);
        }
        if !(MIN_CACHE_SIZE..=MAX_CACHE_SIZE).contains(&max_size) {
            return Err(ConfigError::CacheSizeOutOfRange {
                got: max_size,
                min: MIN_CACHE_SIZE,
                max: MAX_CACHE_SIZE,
            });
        }
        let default_ttl_ms = default_ttl.as_millis() as u64;
        if !(MIN_CACHE_TTL_MS..=MAX_CACHE_TTL_MS).contains(&default_ttl_ms) {
            return Err(ConfigError::CacheTtlOutOfRange {
                got: default_ttl_ms,
                min: MIN_CACHE_TTL_MS,
                max: MAX_CACHE_TTL_MS,
            });
        }
        let capacity = NonZeroUsize::new(max_size).expect("bounds checked above");
        Ok(Self {
            service_name: service_name.to_string(),
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl_ms,
            clock,
        })
    }

    /// Insert or refresh an entry. Refreshing updates both the timestamp and
    /// the LRU recency. When the cache is full the least-recently-used entry
    /// is evicted.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        validate_key(key)?;
        let ttl_ms = match ttl {
            Some(ttl) => {
                let ms = ttl.as_millis() as u64;
                if !(MIN_CACHE_TTL_MS..=MAX_CACHE_TTL_MS).contains(&ms) {
                    return Err(CacheError::InvalidTtl {
                        got: ms,
                        min: MIN_CACHE_TTL_MS,
                        max: MAX_CACHE_TTL_MS,
                    });
                }
                ms
            }
            None => self.default_ttl_ms,
        };
        let entry = CacheEntry { value, inserted_at_ms: self.clock.now_millis(), ttl_ms };
        self.lock().push(key.to_string(), entry);
        Ok(())
    }

    /// Read an entry, updating its recency. Entries past their TTL are still
    /// returned (and logged at debug) rather than deleted.
    pub fn get(&self, key: &str) -> Option<Value> {
        if validate_key(key).is_err() {
            return None;
        }
        let now = self.clock.now_millis();
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        if entry.is_expired(now) {
            tracing::debug!(
                service = %self.service_name,
                key,
                age_ms = now.saturating_sub(entry.inserted_at_ms),
                ttl_ms = entry.ttl_ms,
                "serving expired cache entry"
            );
        }
        Some(entry.value.clone())
    }

    /// Presence check regardless of expiry. Does not touch recency.
    pub fn has(&self, key: &str) -> bool {
        if validate_key(key).is_err() {
            return false;
        }
        self.lock().peek(key).is_some()
    }

    /// Remove one entry; returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        if validate_key(key).is_err() {
            return false;
        }
        self.lock().pop(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Purge entries strictly past their TTL; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        if !expired.is_empty() {
            tracing::debug!(
                service = %self.service_name,
                removed = expired.len(),
                "cache cleanup"
            );
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for FallbackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackCache")
            .field("service", &self.service_name)
            .field("len", &self.len())
            .field("default_ttl_ms", &self.default_ttl_ms)
            .finish()
    }
}

/// Keys must be non-empty after trimming; interior whitespace is allowed.
fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.trim().is_empty() {
        return Err(CacheError::InvalidKey);
    }
    Ok(())
}
