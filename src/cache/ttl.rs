//! Cache TTL Tiers
//!
//! Named expiry tiers. Call sites choose a tier by freshness intent
//! (volatile aggregate vs. durable daily snapshot) instead of tuning raw
//! numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Tier Durations
// =============================================================================

/// Volatile values: 1 minute
pub const TTL_SHORT_SECS: u64 = 60;

/// Live aggregates: 5 minutes
pub const TTL_MEDIUM_SECS: u64 = 300;

/// Slow-moving lookups: 30 minutes
pub const TTL_LONG_SECS: u64 = 1800;

/// Reference data: 1 hour
pub const TTL_EXTENDED_SECS: u64 = 3600;

/// Point-in-time daily snapshots: 24 hours
pub const TTL_SNAPSHOT_SECS: u64 = 86_400;

// =============================================================================
// Cache TTL
// =============================================================================

/// Expiry policy for a cache write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTtl {
    Short,
    #[default]
    Medium,
    Long,
    Extended,
    Snapshot,
    /// Explicit lifetime for the rare caller no tier fits
    Seconds(u64),
}

impl CacheTtl {
    /// Lifetime in seconds
    pub fn as_secs(&self) -> u64 {
        match self {
            CacheTtl::Short => TTL_SHORT_SECS,
            CacheTtl::Medium => TTL_MEDIUM_SECS,
            CacheTtl::Long => TTL_LONG_SECS,
            CacheTtl::Extended => TTL_EXTENDED_SECS,
            CacheTtl::Snapshot => TTL_SNAPSHOT_SECS,
            CacheTtl::Seconds(secs) => *secs,
        }
    }

    /// All named tiers, shortest first
    pub fn tiers() -> &'static [CacheTtl] {
        &[
            CacheTtl::Short,
            CacheTtl::Medium,
            CacheTtl::Long,
            CacheTtl::Extended,
            CacheTtl::Snapshot,
        ]
    }
}

impl fmt::Display for CacheTtl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTtl::Short => write!(f, "short"),
            CacheTtl::Medium => write!(f, "medium"),
            CacheTtl::Long => write!(f, "long"),
            CacheTtl::Extended => write!(f, "extended"),
            CacheTtl::Snapshot => write!(f, "snapshot"),
            CacheTtl::Seconds(secs) => write!(f, "{}s", secs),
        }
    }
}
