//! Metrics hooks for cache operations.
//!
//! Implement [`CacheMetrics`] to forward hit/miss/error events to your
//! monitoring system:
//!
//! ```ignore
//! use owner_totals::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("owner_totals_hits").inc();
//!     }
//! }
//!
//! // let cache = OwnerTotalsCache::new(backend, repo, config)
//! //     .with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! The default is [`NoOpMetrics`]. [`CounterMetrics`] keeps plain atomic
//! counters and is handy in tests and health endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Trait for cache metrics collection.
///
/// Every method receives the cache key involved. Default implementations
/// write to the `log` facade.
pub trait CacheMetrics: Send + Sync {
    /// An owner's totals were served from the cache.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// An owner's totals were recomputed from the repository.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// An entry or the warm-up marker was written.
    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// An entry was invalidated.
    fn record_delete(&self, key: &str, duration: Duration) {
        debug!("Cache DELETE: {} took {:?}", key, duration);
    }

    /// A store or repository operation failed.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_delete(&self, _key: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

/// Atomic counters for each event. Clones share the same counters.
#[derive(Clone, Default)]
pub struct CounterMetrics {
    counters: Arc<Counters>,
}

/// Point-in-time copy of [`CounterMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            sets: c.sets.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetrics for CounterMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self, _key: &str, _duration: Duration) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_set(&self, _key: &str, _duration: Duration) {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
    }

    fn record_delete(&self, _key: &str, _duration: Duration) {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, key: &str, error: &str) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        warn!("Cache ERROR for {}: {}", key, error);
    }
}
