//! ESTA Cache - Tenant-Scoped Caching and Circuit Breakers
//!
//! Shared infrastructure for ESTA compliance services: a cache-aside layer
//! over a Redis-compatible REST store, and circuit breakers whose state lives
//! in the same store so every instance sees the same circuits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Request Handlers                             │
//! ├─────────────────────────────────┬───────────────────────────────────┤
//! │      Domain Snapshot Cache      │        Circuit Registry           │
//! │  (balances, dashboard, rollups) │ (database, email, ocr, payroll)   │
//! ├─────────────────────────────────┼───────────────────────────────────┤
//! │          Cache Service          │        Circuit Breaker            │
//! │  (typed get/set, cache-aside,   │  (CLOSED / OPEN / HALF_OPEN,      │
//! │   tenant + prefix invalidation) │   persisted per circuit)          │
//! ├─────────────────────────────────┴───────────────────────────────────┤
//! │                        KvStore (trait)                              │
//! │   ┌───────────────────────────┐   ┌─────────────────────────────┐   │
//! │   │   RestStore (Upstash)     │   │  MemoryStore (fallback)     │   │
//! │   └───────────────────────────┘   └─────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`store`]: Key-value store port and its REST and in-memory adapters
//! - [`cache`]: Key construction, TTL tiers and the cache service
//! - [`circuit`]: Persisted circuit breakers and the named registry
//! - [`snapshot`]: Typed caching for domain snapshot shapes
//! - [`error`]: Error types and handling

pub mod cache;
pub mod circuit;
pub mod error;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use cache::{
    build_cache_key, subkey, CacheConfig, CacheKey, CacheLookup, CacheService,
    CacheStatsSnapshot, CacheTtl, APP_NAMESPACE,
};

pub use circuit::{
    CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitMetrics, CircuitOpenError,
    CircuitRegistry, CircuitState,
};

pub use error::{Error, ErrorAction, Result};

pub use snapshot::{DashboardAggregate, EmployeeBalanceSnapshot, EmployerRollup, SnapshotCache};

pub use store::{connect, KeyTtl, KvStore, KvStoreRef, MemoryStore, RestStore, StoreConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
