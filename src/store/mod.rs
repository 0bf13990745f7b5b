//! Key-Value Store Client
//!
//! The minimal store contract the cache and circuit breaker are built on,
//! plus two implementations:
//! - [`RestStore`]: Redis-compatible REST endpoint (remote, shared across instances)
//! - [`MemoryStore`]: in-process fallback for local development and tests
//!
//! Callers receive an explicitly constructed `Arc<dyn KvStore>`; there is no
//! hidden global client. Use [`connect`] at process start to pick the backend
//! from a [`StoreConfig`].

mod memory;
mod rest;

pub use memory::MemoryStore;
pub(crate) use memory::glob_to_regex;
pub use rest::RestStore;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the REST endpoint URL
pub const STORE_URL_ENV: &str = "UPSTASH_REDIS_REST_URL";

/// Environment variable holding the REST bearer token
pub const STORE_TOKEN_ENV: &str = "UPSTASH_REDIS_REST_TOKEN";

// =============================================================================
// Key TTL
// =============================================================================

/// Remaining lifetime of a key, as reported by `TTL`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key expires in this many seconds
    Expires(u64),
    /// Key exists without an expiry (raw `-1`)
    Persistent,
    /// Key is absent or already expired (raw `-2`)
    Missing,
}

impl KeyTtl {
    /// Interpret the raw Redis `TTL` reply
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            -1 => KeyTtl::Persistent,
            r if r < 0 => KeyTtl::Missing,
            r => KeyTtl::Expires(r as u64),
        }
    }

    /// Raw Redis representation (`-1` persistent, `-2` missing)
    pub fn as_raw(&self) -> i64 {
        match self {
            KeyTtl::Expires(secs) => *secs as i64,
            KeyTtl::Persistent => -1,
            KeyTtl::Missing => -2,
        }
    }

    /// Seconds remaining, if the key has a finite expiry
    pub fn seconds(&self) -> Option<u64> {
        match self {
            KeyTtl::Expires(secs) => Some(*secs),
            _ => None,
        }
    }
}

// =============================================================================
// KvStore Trait (Port)
// =============================================================================

/// Minimal key-value store operations
///
/// Values are opaque strings; typing and serialization live in the cache
/// layer. Implementations must not retry: transport errors go straight back
/// to the caller.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Human-readable backend name for logs
    fn backend(&self) -> &'static str;

    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value without expiry (clears any previous expiry)
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Store a value that expires after `ttl_seconds`
    ///
    /// A zero TTL is rejected, matching the remote store.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// List keys matching a glob pattern (`*` wildcard)
    ///
    /// Note: this is a full key-space scan on most backends.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Fetch several keys in one round-trip, positionally aligned with `keys`
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Remaining lifetime of a key
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Check connectivity
    async fn ping(&self) -> Result<()>;
}

/// Type alias for a shared store handle
pub type KvStoreRef = Arc<dyn KvStore>;

// =============================================================================
// Store Configuration
// =============================================================================

/// Configuration selecting and tuning the store backend
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// REST endpoint URL
    pub rest_url: Option<String>,
    /// REST bearer token
    pub rest_token: Option<String>,
    /// Per-request HTTP timeout for the REST backend
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            rest_url: None,
            rest_token: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Read the endpoint and token from the environment.
    ///
    /// # Environment Variables
    /// - `UPSTASH_REDIS_REST_URL`: REST endpoint URL
    /// - `UPSTASH_REDIS_REST_TOKEN`: bearer token
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            rest_url: non_empty(STORE_URL_ENV),
            rest_token: non_empty(STORE_TOKEN_ENV),
            ..Default::default()
        }
    }

    /// Whether both remote parameters are present
    pub fn is_remote(&self) -> bool {
        self.rest_url.is_some() && self.rest_token.is_some()
    }
}

static FALLBACK_WARNED: AtomicBool = AtomicBool::new(false);

/// Build the store for this process.
///
/// Missing endpoint or token silently selects the shared in-memory fallback;
/// the warning is logged once per process.
pub fn connect(config: &StoreConfig) -> Result<KvStoreRef> {
    match (&config.rest_url, &config.rest_token) {
        (Some(url), Some(token)) => {
            let store = RestStore::new(url, token, config.request_timeout)?;
            info!(endpoint = %url, "Using REST key-value store");
            Ok(Arc::new(store))
        }
        _ => {
            if !FALLBACK_WARNED.swap(true, Ordering::Relaxed) {
                warn!(
                    "{} / {} not set; falling back to in-memory store (not shared across instances)",
                    STORE_URL_ENV, STORE_TOKEN_ENV
                );
            }
            Ok(MemoryStore::shared())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ttl_raw_mapping() {
        assert_eq!(KeyTtl::from_raw(-1), KeyTtl::Persistent);
        assert_eq!(KeyTtl::from_raw(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_raw(42), KeyTtl::Expires(42));

        assert_eq!(KeyTtl::Persistent.as_raw(), -1);
        assert_eq!(KeyTtl::Missing.as_raw(), -2);
        assert_eq!(KeyTtl::Expires(7).seconds(), Some(7));
        assert_eq!(KeyTtl::Persistent.seconds(), None);
    }

    #[tokio::test]
    async fn test_connect_falls_back_without_credentials() {
        let config = StoreConfig {
            rest_url: Some("https://kv.example.com".into()),
            rest_token: None,
            ..Default::default()
        };
        assert!(!config.is_remote());

        let store = connect(&config).unwrap();
        assert_eq!(store.backend(), "memory");
        store.ping().await.unwrap();
    }

    #[test]
    fn test_connect_remote_with_credentials() {
        let config = StoreConfig {
            rest_url: Some("https://kv.example.com".into()),
            rest_token: Some("secret".into()),
            ..Default::default()
        };
        assert!(config.is_remote());

        let store = connect(&config).unwrap();
        assert_eq!(store.backend(), "rest");
    }
}
