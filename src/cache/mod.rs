//! Tenant-Scoped Cache
//!
//! Cache-aside caching over a shared key-value store, with every key scoped
//! to a tenant:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Cache Service                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  get / set / delete      batch_get (MGET)      get_or_compute            │
//! │         │                      │                     │                   │
//! │         └──────────────┬───────┴─────────────────────┘                   │
//! │                        │                                                 │
//! │          ┌─────────────┴─────────────┐    ┌────────────────────────┐    │
//! │          │  Key builder              │    │  Codec (JSON)          │    │
//! │          │  app:{tenant}:{prefix}:.. │    │  decode failure = miss │    │
//! │          └─────────────┬─────────────┘    └────────────────────────┘    │
//! ├────────────────────────┼────────────────────────────────────────────────┤
//! │                        ▼                                                 │
//! │            KvStore (REST remote | in-memory fallback)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use esta_cache::cache::{CacheService, CacheTtl};
//! use esta_cache::store::{connect, StoreConfig};
//!
//! let store = connect(&StoreConfig::from_env())?;
//! let cache = CacheService::new(store);
//!
//! let totals: Totals = cache
//!     .get_or_compute("tenant-1", "dashboard", "summary", || compute_totals(), CacheTtl::Medium)
//!     .await?;
//!
//! // Drop everything cached for the tenant after a bulk import
//! let removed = cache.invalidate_all_for_tenant("tenant-1").await?;
//! ```

pub mod codec;
pub mod key;
pub mod metrics;
pub mod service;
pub mod ttl;

// Re-export main types
pub use key::{build_cache_key, subkey, CacheKey, APP_NAMESPACE};
pub use metrics::{CacheMetrics, CacheStatsSnapshot};
pub use service::{CacheConfig, CacheLookup, CacheService};
pub use ttl::CacheTtl;
