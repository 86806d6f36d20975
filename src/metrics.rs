//! Call metrics with a cached snapshot.
//!
//! Counters live behind a mutex; the published snapshot is swapped atomically
//! so readers on the hot path never take the lock. A dirty flag set by every
//! mutator decides when `get_metrics` has to rebuild.

use crate::clock::Clock;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Sentinel for "no latency samples yet"; reported externally as 0.
const NO_SAMPLES: u64 = u64::MAX;

/// Point-in-time view of the counters. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_retries: u64,
    pub circuit_breaker_trips: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub avg_latency_ms: u64,
    pub max_latency_ms: u64,
    pub min_latency_ms: u64,
    pub last_reset_at: u64,
}

#[derive(Debug)]
struct Counters {
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    total_retries: u64,
    circuit_breaker_trips: u64,
    cache_hits: u64,
    cache_misses: u64,
    latency_sum_ms: u64,
    max_latency_ms: u64,
    min_latency_ms: u64,
    last_reset_at: u64,
}

impl Counters {
    fn new(now_millis: u64) -> Self {
        Self {
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            total_retries: 0,
            circuit_breaker_trips: 0,
            cache_hits: 0,
            cache_misses: 0,
            latency_sum_ms: 0,
            max_latency_ms: 0,
            min_latency_ms: NO_SAMPLES,
            last_reset_at: now_millis,
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let avg_latency_ms = if self.successful_calls == 0 {
            0
        } else {
            (self.latency_sum_ms as f64 / self.successful_calls as f64).round() as u64
        };
        MetricsSnapshot {
            total_calls: self.total_calls,
            successful_calls: self.successful_calls,
            failed_calls: self.failed_calls,
            total_retries: self.total_retries,
            circuit_breaker_trips: self.circuit_breaker_trips,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            avg_latency_ms,
            max_latency_ms: self.max_latency_ms,
            min_latency_ms: if self.min_latency_ms == NO_SAMPLES { 0 } else { self.min_latency_ms },
            last_reset_at: self.last_reset_at,
        }
    }
}

/// Accumulates call counters and latency aggregates. All operations are
/// infallible and safe to invoke concurrently.
#[derive(Debug)]
pub struct MetricsTracker {
    counters: Mutex<Counters>,
    snapshot: ArcSwap<MetricsSnapshot>,
    dirty: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl MetricsTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let counters = Counters::new(clock.now_millis());
        let snapshot = counters.snapshot();
        Self {
            counters: Mutex::new(counters),
            snapshot: ArcSwap::from_pointee(snapshot),
            dirty: AtomicBool::new(false),
            clock,
        }
    }

    pub fn record_call_start(&self) {
        self.mutate(|c| c.total_calls += 1);
    }

    pub fn record_success(&self, latency_ms: u64) {
        self.mutate(|c| {
            c.successful_calls += 1;
            c.latency_sum_ms = c.latency_sum_ms.saturating_add(latency_ms);
            c.max_latency_ms = c.max_latency_ms.max(latency_ms);
            c.min_latency_ms = c.min_latency_ms.min(latency_ms);
        });
    }

    pub fn record_failure(&self) {
        self.mutate(|c| c.failed_calls += 1);
    }

    pub fn record_retry(&self) {
        self.mutate(|c| c.total_retries += 1);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.mutate(|c| c.circuit_breaker_trips += 1);
    }

    pub fn record_cache_hit(&self) {
        self.mutate(|c| c.cache_hits += 1);
    }

    pub fn record_cache_miss(&self) {
        self.mutate(|c| c.cache_misses += 1);
    }

    pub fn reset(&self) {
        let now = self.clock.now_millis();
        self.mutate(|c| *c = Counters::new(now));
    }

    /// Current snapshot. Rebuilt only when a mutator ran since the last call;
    /// otherwise the previously published `Arc` is returned as-is.
    pub fn get_metrics(&self) -> Arc<MetricsSnapshot> {
        if self.dirty.load(Ordering::Acquire) {
            let guard = self.lock();
            // Re-check under the lock; another reader may have rebuilt already.
            if self.dirty.load(Ordering::Acquire) {
                self.snapshot.store(Arc::new(guard.snapshot()));
                self.dirty.store(false, Ordering::Release);
            }
        }
        self.snapshot.load_full()
    }

    /// Percentage of successful calls, rounded; 100 when nothing was called.
    pub fn success_rate(&self) -> u64 {
        let guard = self.lock();
        if guard.total_calls == 0 {
            100
        } else {
            (guard.successful_calls as f64 / guard.total_calls as f64 * 100.0).round() as u64
        }
    }

    /// Percentage of cache reads that hit, rounded; 0 when the cache was never consulted.
    pub fn cache_hit_rate(&self) -> u64 {
        let guard = self.lock();
        let reads = guard.cache_hits + guard.cache_misses;
        if reads == 0 {
            0
        } else {
            (guard.cache_hits as f64 / reads as f64 * 100.0).round() as u64
        }
    }

    fn mutate(&self, f: impl FnOnce(&mut Counters)) {
        let mut guard = self.lock();
        f(&mut guard);
        // Published while still holding the lock so a concurrent rebuild
        // cannot clear the flag for an update it has not seen.
        self.dirty.store(true, Ordering::Release);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
