//! Tenant-Scoped Cache Service
//!
//! Typed get/set/delete over a [`KvStore`], bulk invalidation by tenant or
//! prefix, batch reads and the cache-aside primitive every domain-level cache
//! is built on.
//!
//! Store transport errors propagate unchanged and are never retried here.
//! Undecodable payloads are misses, so a corrupt entry heals on the next
//! recompute instead of failing the request.

use crate::cache::codec;
use crate::cache::key::{build_cache_key, prefix_pattern, tenant_pattern, APP_NAMESPACE};
use crate::cache::metrics::{CacheMetrics, CacheStatsSnapshot};
use crate::cache::ttl::CacheTtl;
use crate::error::{Error, Result};
use crate::store::KvStoreRef;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the cache service
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Top-level key namespace
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: APP_NAMESPACE.to_string(),
        }
    }
}

// =============================================================================
// Cache Lookup
// =============================================================================

/// Result of a typed cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    /// Cached value was found and decoded
    Hit {
        data: T,
        /// Seconds until expiry, when the store reports one
        ttl: Option<u64>,
    },
    /// Absent, expired, or undecodable
    Miss,
}

impl<T> CacheLookup<T> {
    /// Check if this is a cache hit
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit { .. })
    }

    /// Check if this is a cache miss
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookup::Miss)
    }

    /// Get the data if this is a hit
    pub fn data(&self) -> Option<&T> {
        match self {
            CacheLookup::Hit { data, .. } => Some(data),
            CacheLookup::Miss => None,
        }
    }

    /// Take the data if this is a hit
    pub fn into_data(self) -> Option<T> {
        match self {
            CacheLookup::Hit { data, .. } => Some(data),
            CacheLookup::Miss => None,
        }
    }

    /// Remaining TTL if this is a hit with a known expiry
    pub fn ttl(&self) -> Option<u64> {
        match self {
            CacheLookup::Hit { ttl, .. } => *ttl,
            CacheLookup::Miss => None,
        }
    }
}

// =============================================================================
// Cache Service
// =============================================================================

/// Tenant-namespaced cache over a shared key-value store
pub struct CacheService {
    store: KvStoreRef,
    config: CacheConfig,
    metrics: CacheMetrics,
}

impl CacheService {
    /// Create a cache service with the default namespace
    pub fn new(store: KvStoreRef) -> Arc<Self> {
        Self::with_config(store, CacheConfig::default())
    }

    /// Create a cache service with custom configuration
    pub fn with_config(store: KvStoreRef, config: CacheConfig) -> Arc<Self> {
        debug!(
            namespace = %config.namespace,
            backend = store.backend(),
            "Cache service initialized"
        );
        Arc::new(Self {
            store,
            config,
            metrics: CacheMetrics::new(),
        })
    }

    /// Underlying store handle
    pub fn store(&self) -> &KvStoreRef {
        &self.store
    }

    /// Key namespace in use
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Full storage key for `(tenant_id, prefix, key)`
    pub fn build_key(&self, tenant_id: &str, prefix: &str, key: &str) -> String {
        build_cache_key(&self.config.namespace, tenant_id, prefix, &[key])
    }

    /// Current metrics
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.metrics.snapshot()
    }

    /// Store a value with the given TTL tier
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        tenant_id: &str,
        prefix: &str,
        key: &str,
        value: &T,
        ttl: CacheTtl,
    ) -> Result<()> {
        let full_key = self.build_key(tenant_id, prefix, key);
        let payload = codec::encode(value)?;

        self.store
            .set_with_ttl(&full_key, &payload, ttl.as_secs())
            .await?;
        self.metrics.record_set();

        debug!(key = %full_key, ttl = %ttl, size = payload.len(), "Stored cache entry");
        Ok(())
    }

    /// Look up a value
    ///
    /// Misses and undecodable payloads both yield [`CacheLookup::Miss`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        tenant_id: &str,
        prefix: &str,
        key: &str,
    ) -> Result<CacheLookup<T>> {
        let full_key = self.build_key(tenant_id, prefix, key);

        let Some(raw) = self.store.get(&full_key).await? else {
            self.metrics.record_miss();
            return Ok(CacheLookup::Miss);
        };

        let Some(data) = codec::decode::<T>(&full_key, &raw) else {
            self.metrics.record_decode_failure();
            return Ok(CacheLookup::Miss);
        };

        let ttl = self.store.ttl(&full_key).await?.seconds();
        self.metrics.record_hit();
        Ok(CacheLookup::Hit { data, ttl })
    }

    /// Delete a single entry, returning whether it existed
    pub async fn delete(&self, tenant_id: &str, prefix: &str, key: &str) -> Result<bool> {
        let full_key = self.build_key(tenant_id, prefix, key);
        let removed = self.store.delete(&[full_key.clone()]).await?;
        self.metrics.record_deletes(removed);

        debug!(key = %full_key, removed = removed, "Deleted cache entry");
        Ok(removed > 0)
    }

    /// Delete every entry under a tenant's prefix, returning the count
    pub async fn invalidate_prefix(&self, tenant_id: &str, prefix: &str) -> Result<u64> {
        let pattern = prefix_pattern(&self.config.namespace, tenant_id, prefix)?;
        self.invalidate_pattern(&pattern).await
    }

    /// Delete every entry belonging to a tenant, returning the count
    pub async fn invalidate_all_for_tenant(&self, tenant_id: &str) -> Result<u64> {
        let pattern = tenant_pattern(&self.config.namespace, tenant_id)?;
        self.invalidate_pattern(&pattern).await
    }

    /// Enumerate matches and remove them in one bulk delete
    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let keys = self.store.keys(pattern).await?;
        if keys.is_empty() {
            debug!(pattern = %pattern, "No cache entries to invalidate");
            return Ok(0);
        }

        let removed = self.store.delete(&keys).await?;
        self.metrics.record_invalidated(removed);

        info!(pattern = %pattern, matched = keys.len(), removed = removed, "Invalidated cache entries");
        Ok(removed)
    }

    /// Cache-aside read: return the cached value or compute, store and return it.
    ///
    /// Concurrent callers missing on the same key may each run `compute`;
    /// the last write wins. Nothing is cached when `compute` fails.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        tenant_id: &str,
        prefix: &str,
        key: &str,
        compute: F,
        ttl: CacheTtl,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<Error>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let CacheLookup::Hit { data, .. } = self.get::<T>(tenant_id, prefix, key).await? {
            return Ok(data);
        }

        self.metrics.record_compute();
        let value = compute().await?;
        self.set(tenant_id, prefix, key, &value, ttl).await?;
        Ok(value)
    }

    /// Fetch several keys under one prefix with a single multi-get.
    ///
    /// Each payload decodes independently; a corrupt entry is a miss for that
    /// key only.
    pub async fn batch_get<T, K>(
        &self,
        tenant_id: &str,
        prefix: &str,
        keys: &[K],
    ) -> Result<HashMap<String, CacheLookup<T>>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let full_keys: Vec<String> = keys
            .iter()
            .map(|k| self.build_key(tenant_id, prefix, k.as_ref()))
            .collect();
        let values = self.store.mget(&full_keys).await?;

        let mut results = HashMap::with_capacity(keys.len());
        for ((key, full_key), raw) in keys.iter().zip(&full_keys).zip(values) {
            let lookup = match raw {
                None => {
                    self.metrics.record_miss();
                    CacheLookup::Miss
                }
                Some(raw) => match codec::decode::<T>(full_key, &raw) {
                    Some(data) => {
                        self.metrics.record_hit();
                        CacheLookup::Hit { data, ttl: None }
                    }
                    None => {
                        self.metrics.record_decode_failure();
                        CacheLookup::Miss
                    }
                },
            };
            results.insert(key.as_ref().to_string(), lookup);
        }

        Ok(results)
    }

    /// Check store connectivity; never errors
    pub async fn is_available(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = self.store.backend(), error = %e, "Cache store unavailable");
                false
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyTtl, KvStore, MemoryStore};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Aggregate {
        employees: u32,
        hours: f64,
    }

    fn test_cache() -> (Arc<CacheService>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CacheService::new(store.clone()), store)
    }

    /// Store whose every call fails, standing in for a broken transport
    struct BrokenStore;

    fn broken(command: &str) -> Error {
        Error::StoreResponse {
            command: command.into(),
            response: "connection reset".into(),
        }
    }

    #[async_trait]
    impl KvStore for BrokenStore {
        fn backend(&self) -> &'static str {
            "broken"
        }
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(broken("GET"))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(broken("SET"))
        }
        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: u64) -> Result<()> {
            Err(broken("SET"))
        }
        async fn delete(&self, _keys: &[String]) -> Result<u64> {
            Err(broken("DEL"))
        }
        async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
            Err(broken("KEYS"))
        }
        async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<String>>> {
            Err(broken("MGET"))
        }
        async fn ttl(&self, _key: &str) -> Result<KeyTtl> {
            Err(broken("TTL"))
        }
        async fn ping(&self) -> Result<()> {
            Err(broken("PING"))
        }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (cache, _store) = test_cache();
        let value = Aggregate { employees: 12, hours: 96.5 };

        cache
            .set("t1", "dashboard", "summary", &value, CacheTtl::Medium)
            .await
            .unwrap();

        let result = cache.get::<Aggregate>("t1", "dashboard", "summary").await.unwrap();
        assert_eq!(result.data(), Some(&value));
        let ttl = result.ttl().unwrap();
        assert!(ttl > 0 && ttl <= 300);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _store) = test_cache();
        let result = cache.get::<Aggregate>("t1", "dashboard", "missing").await.unwrap();
        assert!(result.is_miss());
        assert_eq!(result.data(), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_miss() {
        let (cache, store) = test_cache();
        store
            .set_with_ttl("app:t1:dashboard:summary", "{\"employees\":", 60)
            .await
            .unwrap();

        let result = cache.get::<Aggregate>("t1", "dashboard", "summary").await.unwrap();
        assert!(result.is_miss());
        assert_eq!(cache.stats().decode_failures, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let (cache, _store) = test_cache();
        cache.set("t1", "p", "k", &1u32, CacheTtl::Short).await.unwrap();

        assert!(cache.delete("t1", "p", "k").await.unwrap());
        assert!(!cache.delete("t1", "p", "k").await.unwrap());
        assert!(cache.get::<u32>("t1", "p", "k").await.unwrap().is_miss());
    }

    #[tokio::test]
    async fn test_get_or_compute_runs_once() {
        let (cache, _store) = test_cache();
        let calls = AtomicUsize::new(0);

        let first: u32 = cache
            .get_or_compute(
                "t1",
                "rollup",
                "2025-01",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(7)
                },
                CacheTtl::Long,
            )
            .await
            .unwrap();
        assert_eq!(first, 7);

        let second: u32 = cache
            .get_or_compute(
                "t1",
                "rollup",
                "2025-01",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(99)
                },
                CacheTtl::Long,
            )
            .await
            .unwrap();

        assert_eq!(second, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().computes, 1);
    }

    #[derive(Debug)]
    enum ComputeError {
        Cache(Error),
        Upstream(&'static str),
    }

    impl From<Error> for ComputeError {
        fn from(e: Error) -> Self {
            ComputeError::Cache(e)
        }
    }

    #[tokio::test]
    async fn test_get_or_compute_failure_not_cached() {
        let (cache, _store) = test_cache();

        let err = cache
            .get_or_compute::<u32, ComputeError, _, _>(
                "t1",
                "rollup",
                "2025-02",
                || async { Err(ComputeError::Upstream("db down")) },
                CacheTtl::Medium,
            )
            .await
            .unwrap_err();
        assert_matches!(err, ComputeError::Upstream("db down"));

        assert!(cache.get::<u32>("t1", "rollup", "2025-02").await.unwrap().is_miss());
    }

    #[tokio::test]
    async fn test_invalidate_prefix_scoped() {
        let (cache, _store) = test_cache();
        for key in ["a", "b", "c"] {
            cache.set("t1", "accrual", key, &1u8, CacheTtl::Short).await.unwrap();
        }
        cache.set("t1", "dashboard", "summary", &2u8, CacheTtl::Short).await.unwrap();
        cache.set("t2", "accrual", "a", &3u8, CacheTtl::Short).await.unwrap();

        assert_eq!(cache.invalidate_prefix("t1", "accrual").await.unwrap(), 3);
        assert_eq!(cache.invalidate_prefix("t1", "accrual").await.unwrap(), 0);

        assert!(cache.get::<u8>("t1", "dashboard", "summary").await.unwrap().is_hit());
        assert!(cache.get::<u8>("t2", "accrual", "a").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn test_invalidation_counted_apart_from_deletes() {
        let (cache, _store) = test_cache();
        for key in ["a", "b", "c"] {
            cache.set("t1", "accrual", key, &1u8, CacheTtl::Short).await.unwrap();
        }
        cache.set("t1", "dashboard", "summary", &2u8, CacheTtl::Short).await.unwrap();

        cache.invalidate_prefix("t1", "accrual").await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.invalidated, 3);
        assert_eq!(stats.deletes, 0);

        cache.delete("t1", "dashboard", "summary").await.unwrap();
        cache.invalidate_all_for_tenant("t1").await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.invalidated, 3);
        assert_eq!(stats.deletes, 1);
    }

    #[tokio::test]
    async fn test_invalidation_rejects_glob_components() {
        let (cache, _store) = test_cache();
        cache.set("t1", "accrual", "a", &1u8, CacheTtl::Short).await.unwrap();
        cache.set("t2", "accrual", "a", &2u8, CacheTtl::Short).await.unwrap();

        assert_matches!(
            cache.invalidate_all_for_tenant("*").await,
            Err(Error::InvalidKeyComponent { component: "tenant", .. })
        );
        assert_matches!(
            cache.invalidate_all_for_tenant("t[12]").await,
            Err(Error::InvalidKeyComponent { component: "tenant", .. })
        );
        assert_matches!(
            cache.invalidate_prefix("t1", "acc?ual").await,
            Err(Error::InvalidKeyComponent { component: "prefix", .. })
        );
        assert_matches!(
            cache.invalidate_prefix("t1", "*").await,
            Err(Error::InvalidKeyComponent { component: "prefix", .. })
        );

        assert!(cache.get::<u8>("t1", "accrual", "a").await.unwrap().is_hit());
        assert!(cache.get::<u8>("t2", "accrual", "a").await.unwrap().is_hit());
        assert_eq!(cache.stats().invalidated, 0);
    }

    #[tokio::test]
    async fn test_circuit_tenant_is_reserved() {
        let (cache, store) = test_cache();
        store
            .set_with_ttl("app:circuit:email", "{\"state\":\"OPEN\"}", 3600)
            .await
            .unwrap();

        assert_matches!(
            cache.invalidate_all_for_tenant("circuit").await,
            Err(Error::InvalidKeyComponent { reason: "reserved for circuit records", .. })
        );
        assert_matches!(
            cache.invalidate_prefix("circuit", "email").await,
            Err(Error::InvalidKeyComponent { component: "tenant", .. })
        );
        assert!(store.get("app:circuit:email").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_all_for_tenant() {
        let (cache, _store) = test_cache();
        cache.set("t1", "accrual", "a", &1u8, CacheTtl::Short).await.unwrap();
        cache.set("t1", "dashboard", "summary", &2u8, CacheTtl::Short).await.unwrap();
        cache.set("t10", "accrual", "a", &3u8, CacheTtl::Short).await.unwrap();

        assert_eq!(cache.invalidate_all_for_tenant("t1").await.unwrap(), 2);
        assert!(cache.get::<u8>("t10", "accrual", "a").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn test_batch_get_partitions() {
        let (cache, store) = test_cache();
        cache.set("t1", "accrual", "e1", &10u32, CacheTtl::Short).await.unwrap();
        cache.set("t1", "accrual", "e3", &30u32, CacheTtl::Short).await.unwrap();
        store.set_with_ttl("app:t1:accrual:e4", "not-a-number", 60).await.unwrap();

        let results = cache
            .batch_get::<u32, _>("t1", "accrual", &["e4", "e3", "e2", "e1"])
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results["e1"].data(), Some(&10));
        assert_eq!(results["e3"].data(), Some(&30));
        assert!(results["e2"].is_miss());
        assert!(results["e4"].is_miss());

        let empty = cache.batch_get::<u32, &str>("t1", "accrual", &[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_custom_namespace() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheService::with_config(
            store.clone(),
            CacheConfig { namespace: "staging".into() },
        );
        cache.set("t1", "p", "k", &1u8, CacheTtl::Short).await.unwrap();

        assert_eq!(cache.build_key("t1", "p", "k"), "staging:t1:p:k");
        assert!(store.get("staging:t1:p:k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_availability() {
        let (cache, _store) = test_cache();
        assert!(cache.is_available().await);

        let broken_cache = CacheService::new(Arc::new(BrokenStore));
        assert!(!broken_cache.is_available().await);
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let cache = CacheService::new(Arc::new(BrokenStore));

        assert_matches!(
            cache.get::<u8>("t1", "p", "k").await,
            Err(Error::StoreResponse { .. })
        );
        assert_matches!(
            cache.invalidate_all_for_tenant("t1").await,
            Err(Error::StoreResponse { .. })
        );

        let calls = AtomicUsize::new(0);
        let result = cache
            .get_or_compute::<u8, Error, _, _>(
                "t1",
                "p",
                "k",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                },
                CacheTtl::Short,
            )
            .await;
        assert_matches!(result, Err(Error::StoreResponse { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
