//! Cache Metrics
//!
//! Cache-line aligned counters for the cache service. Updated with relaxed
//! atomics on every operation; read through [`CacheMetrics::snapshot`].

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Cache Line Size
// =============================================================================

/// Cache line size for alignment (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// Cache Metrics (Cache-Line Aligned)
// =============================================================================

/// Process-local counters for one cache service, aligned to prevent false sharing
#[repr(C, align(64))]
#[derive(Debug)]
pub struct CacheMetrics {
    /// Lookups answered from the store
    pub hits: AtomicU64,
    /// Lookups that found nothing usable
    pub misses: AtomicU64,
    /// Values written
    pub sets: AtomicU64,
    /// Keys removed by single-entry deletes
    pub deletes: AtomicU64,
    /// Keys removed by prefix or tenant invalidation
    pub invalidated: AtomicU64,
    /// Payloads discarded because they failed to decode
    pub decode_failures: AtomicU64,
    /// Compute functions invoked by cache-aside misses
    pub computes: AtomicU64,
    /// Last update timestamp (Unix millis)
    pub last_update_ms: AtomicU64,
}

// Verify size at compile time
const _: () = assert!(std::mem::size_of::<CacheMetrics>() <= CACHE_LINE_SIZE);

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            computes: AtomicU64::new(0),
            last_update_ms: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record `count` keys removed
    #[inline]
    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
        self.touch();
    }

    /// Record `count` keys removed by a pattern invalidation
    #[inline]
    pub fn record_invalidated(&self, count: u64) {
        self.invalidated.fetch_add(count, Ordering::Relaxed);
        self.touch();
    }

    /// Record a corrupt payload; the lookup also counts as a miss
    #[inline]
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        self.record_miss();
    }

    #[inline]
    pub fn record_compute(&self) {
        self.computes.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Update last update timestamp
    #[inline]
    fn touch(&self) {
        self.last_update_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }

    /// Create a snapshot of current metrics
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
            last_update_ms: self.last_update_ms.load(Ordering::Acquire),
        }
    }
}

// =============================================================================
// Stats Snapshot
// =============================================================================

/// Point-in-time snapshot of cache metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub invalidated: u64,
    pub decode_failures: u64,
    pub computes: u64,
    pub last_update_ms: u64,
}

impl CacheStatsSnapshot {
    /// Get total lookups (hits + misses)
    pub fn total_lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
