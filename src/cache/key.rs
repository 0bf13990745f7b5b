//! Cache Key Construction
//!
//! Keys follow `{namespace}:{tenant_id}:{prefix}:{parts...}`. The format is
//! part of the operational contract: tooling inspects the store by key
//! pattern, so it must stay stable.
//!
//! The tenant segment `circuit` is reserved: circuit breaker records live at
//! `app:circuit:{name}`, which would otherwise fall under that tenant's
//! invalidation pattern.

use crate::error::{Error, Result};
use std::fmt;

/// Default top-level namespace for every key this layer writes
pub const APP_NAMESPACE: &str = "app";

/// Separator between key components
pub const KEY_SEPARATOR: char = ':';

/// Join key components into a storage key.
///
/// Pure and deterministic. Components are expected to be colon-free
/// (tenant UUIDs, fixed prefixes, IDs and ISO dates); a colon inside a
/// component would make two different inputs share a key.
pub fn build_cache_key<S: AsRef<str>>(
    namespace: &str,
    tenant_id: &str,
    prefix: &str,
    parts: &[S],
) -> String {
    let mut key = String::with_capacity(
        namespace.len()
            + tenant_id.len()
            + prefix.len()
            + parts.iter().map(|p| p.as_ref().len() + 1).sum::<usize>()
            + 2,
    );
    key.push_str(namespace);
    key.push(KEY_SEPARATOR);
    key.push_str(tenant_id);
    key.push(KEY_SEPARATOR);
    key.push_str(prefix);
    for part in parts {
        key.push(KEY_SEPARATOR);
        key.push_str(part.as_ref());
    }
    key
}

/// Segment under which circuit breaker records are stored
pub const CIRCUIT_SEGMENT: &str = "circuit";

/// Characters the store's pattern matcher treats specially
const GLOB_METACHARACTERS: &[char] = &['*', '?', '[', ']', '\\'];

/// Reject a caller-supplied component before it is embedded in a glob.
///
/// Pattern components must match literally and stay within one segment.
pub fn check_pattern_component(component: &'static str, value: &str) -> Result<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.contains(GLOB_METACHARACTERS) {
        Some("contains a glob metacharacter")
    } else if value.contains(KEY_SEPARATOR) {
        Some("contains the key separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidKeyComponent {
            component,
            value: value.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn check_tenant(tenant_id: &str) -> Result<()> {
    check_pattern_component("tenant", tenant_id)?;
    if tenant_id == CIRCUIT_SEGMENT {
        return Err(Error::InvalidKeyComponent {
            component: "tenant",
            value: tenant_id.to_string(),
            reason: "reserved for circuit records",
        });
    }
    Ok(())
}

/// Glob matching every key under a tenant's prefix
pub fn prefix_pattern(namespace: &str, tenant_id: &str, prefix: &str) -> Result<String> {
    check_tenant(tenant_id)?;
    check_pattern_component("prefix", prefix)?;
    Ok(format!("{namespace}:{tenant_id}:{prefix}:*"))
}

/// Glob matching every key belonging to a tenant
pub fn tenant_pattern(namespace: &str, tenant_id: &str) -> Result<String> {
    check_tenant(tenant_id)?;
    Ok(format!("{namespace}:{tenant_id}:*"))
}

/// Join caller-supplied sub-key parts (e.g. `employee_id`, ISO date)
pub fn subkey<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(":")
}

// =============================================================================
// Cache Key
// =============================================================================

/// Structured form of a tenant-scoped key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: String,
    pub tenant_id: String,
    pub prefix: String,
    pub parts: Vec<String>,
}

impl CacheKey {
    /// Key in the default namespace
    pub fn new(tenant_id: impl Into<String>, prefix: impl Into<String>, parts: Vec<String>) -> Self {
        Self {
            namespace: APP_NAMESPACE.to_string(),
            tenant_id: tenant_id.into(),
            prefix: prefix.into(),
            parts,
        }
    }

    /// Storage representation
    pub fn to_storage_key(&self) -> String {
        build_cache_key(&self.namespace, &self.tenant_id, &self.prefix, &self.parts)
    }

    /// Parse a storage key back into components.
    ///
    /// Returns None when fewer than three components are present.
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let mut split = key.split(KEY_SEPARATOR);
        let namespace = split.next()?.to_string();
        let tenant_id = split.next()?.to_string();
        let prefix = split.next()?.to_string();
        Some(Self {
            namespace,
            tenant_id,
            prefix,
            parts: split.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_storage_key())
    }
}
