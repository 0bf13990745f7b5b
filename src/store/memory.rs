//! In-Memory Fallback Store
//!
//! Process-local key-value store using DashMap for concurrent access. Used
//! when no remote store is configured. Expiry is checked lazily: an expired
//! entry is evicted by whichever read touches it first.

use crate::error::{Error, Result};
use crate::store::{KeyTtl, KvStore, KvStoreRef};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static SHARED: Lazy<Arc<MemoryStore>> = Lazy::new(|| Arc::new(MemoryStore::new()));

// =============================================================================
// Stored Value
// =============================================================================

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    /// Absolute expiry (Unix millis), None = never expires
    expires_at_ms: Option<i64>,
}

impl StoredValue {
    #[inline]
    fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at_ms, Some(at) if at <= now_ms)
    }
}

#[inline]
fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a `*`-only glob into a regex anchored at both ends.
///
/// Every character other than `*` matches literally.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    Regex::new(&format!("^{}$", body))
        .map_err(|e| Error::Internal(format!("Invalid key pattern {}: {}", pattern, e)))
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-process key-value store with lazy TTL expiry
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    /// Create an isolated store with its own map
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// The process-wide store shared by every fallback caller
    pub fn shared() -> KvStoreRef {
        SHARED.clone()
    }

    /// Number of entries held, including expired ones not yet evicted
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Read a live entry, evicting it if it has expired
    fn live(&self, key: &str) -> Option<StoredValue> {
        let now = now_ms();
        let stored = self.entries.get(key).map(|r| r.value().clone())?;

        if stored.is_expired(now) {
            self.entries.remove_if(key, |_, v| v.is_expired(now));
            None
        } else {
            Some(stored)
        }
    }

    fn insert(&self, key: &str, value: &str, expires_at_ms: Option<i64>) {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at_ms,
            },
        );
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live(key).map(|v| v.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.insert(key, value, None);
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        if ttl_seconds == 0 {
            return Err(Error::InvalidTtl { key: key.to_string() });
        }

        let ttl_ms = i64::try_from(ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.insert(key, value, Some(now_ms().saturating_add(ttl_ms)));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let now = now_ms();
        let mut removed = 0u64;

        for key in keys {
            if let Some((_, stored)) = self.entries.remove(key) {
                if !stored.is_expired(now) {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = glob_to_regex(pattern)?;
        let now = now_ms();

        let mut matched = Vec::new();
        let mut expired = Vec::new();
        for entry in self.entries.iter() {
            if entry.value().is_expired(now) {
                expired.push(entry.key().clone());
            } else if matcher.is_match(entry.key()) {
                matched.push(entry.key().clone());
            }
        }

        // Evict outside the iteration to avoid holding shard locks
        for key in expired {
            self.entries.remove_if(&key, |_, v| v.is_expired(now));
        }

        Ok(matched)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        Ok(keys
            .iter()
            .map(|key| self.live(key).map(|v| v.value))
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let now = now_ms();
        Ok(match self.live(key) {
            None => KeyTtl::Missing,
            Some(StoredValue {
                expires_at_ms: None, ..
            }) => KeyTtl::Persistent,
            Some(StoredValue {
                expires_at_ms: Some(at),
                ..
            }) => {
                // Round up so a live key never reports zero
                let remaining_ms = (at - now).max(1) as u64;
                KeyTtl::Expires(remaining_ms.div_ceil(1000))
            }
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryStore::new();

        store.set("app:t1:x:1", "one").await.unwrap();
        assert_eq!(store.get("app:t1:x:1").await.unwrap().as_deref(), Some("one"));
        assert_eq!(store.get("app:t1:x:2").await.unwrap(), None);

        let removed = store.delete(&keys(&["app:t1:x:1", "app:t1:x:2"])).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get("app:t1:x:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_clears_expiry() {
        let store = MemoryStore::new();

        store.set_with_ttl("k", "v1", 60).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Expires(60));

        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Persistent);
    }

    #[tokio::test]
    async fn test_ttl_contract() {
        let store = MemoryStore::new();

        assert_eq!(store.ttl("absent").await.unwrap(), KeyTtl::Missing);

        store.set_with_ttl("short", "v", 300).await.unwrap();
        let secs = store.ttl("short").await.unwrap().seconds().unwrap();
        assert!(secs > 0 && secs <= 300);
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let store = MemoryStore::new();
        let err = store.set_with_ttl("k", "v", 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTtl { .. }));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lazy_expiry_evicts_on_read() {
        let store = MemoryStore::new();
        store.insert("stale", "old", Some(now_ms() - 1));
        assert_eq!(store.entry_count(), 1);

        assert_eq!(store.get("stale").await.unwrap(), None);
        assert_eq!(store.entry_count(), 0);

        store.insert("stale", "old", Some(now_ms() - 1));
        assert_eq!(store.ttl("stale").await.unwrap(), KeyTtl::Missing);
        assert_eq!(store.delete(&keys(&["stale"])).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keys_pattern_matching() {
        let store = MemoryStore::new();
        store.set("app:t1:accrual:e1:2025-01-15", "a").await.unwrap();
        store.set("app:t1:accrual:e2:2025-01-15", "b").await.unwrap();
        store.set("app:t1:dashboard:summary", "c").await.unwrap();
        store.set("app:t2:accrual:e1:2025-01-15", "d").await.unwrap();
        store.insert("app:t1:accrual:gone", "x", Some(now_ms() - 1));

        let mut found = store.keys("app:t1:accrual:*").await.unwrap();
        found.sort();
        assert_eq!(
            found,
            keys(&["app:t1:accrual:e1:2025-01-15", "app:t1:accrual:e2:2025-01-15"])
        );

        assert_eq!(store.keys("app:t1:*").await.unwrap().len(), 3);
        assert_eq!(store.keys("app:*:accrual:e1:*").await.unwrap().len(), 2);
        assert!(store.keys("app:t3:*").await.unwrap().is_empty());

        // Expired entry was evicted by the scan
        assert_eq!(store.entry_count(), 4);
    }

    #[test]
    fn test_glob_is_anchored_and_literal() {
        let re = glob_to_regex("app:t1.x:*").unwrap();
        assert!(re.is_match("app:t1.x:anything"));
        assert!(!re.is_match("app:t1Xx:anything"));
        assert!(!re.is_match("prefix:app:t1.x:anything"));

        let exact = glob_to_regex("app:t1").unwrap();
        assert!(exact.is_match("app:t1"));
        assert!(!exact.is_match("app:t10"));
    }

    #[tokio::test]
    async fn test_mget_alignment() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.set("c", "3").await.unwrap();

        let values = store.mget(&keys(&["a", "b", "c"])).await.unwrap();
        assert_eq!(values, vec![Some("1".to_string()), None, Some("3".to_string())]);
        assert!(store.mget(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shared_instance_is_process_wide() {
        let a = MemoryStore::shared();
        let b = MemoryStore::shared();

        a.set("memory-test:shared", "yes").await.unwrap();
        assert_eq!(b.get("memory-test:shared").await.unwrap().as_deref(), Some("yes"));
        a.delete(&keys(&["memory-test:shared"])).await.unwrap();
    }
}
