//! Circuit State Records
//!
//! The persisted per-circuit record and its read-only metrics view.

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Circuit State
// =============================================================================

/// Position in the breaker state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow through; failures are counted
    #[default]
    Closed,
    /// Calls are rejected until the reset timeout elapses
    Open,
    /// Probe calls are let through to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

impl FromStr for CircuitState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "closed" => Ok(CircuitState::Closed),
            "open" => Ok(CircuitState::Open),
            "half_open" => Ok(CircuitState::HalfOpen),
            other => Err(Error::Configuration(format!(
                "Unknown circuit state: {} (expected closed, open or half-open)",
                other
            ))),
        }
    }
}

impl CircuitState {
    /// Numeric encoding for gauges (0 closed, 1 half-open, 2 open)
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

// =============================================================================
// Circuit Record
// =============================================================================

/// Persisted state of one named circuit
///
/// Timestamps are Unix millis. Read-modify-written on every call without
/// locking, so concurrent callers may lose each other's updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitRecord {
    pub name: String,
    pub state: CircuitState,
    /// Failures since the last reset to zero
    pub failures: u32,
    /// Consecutive successes while half-open
    pub successes: u32,
    pub last_failure_at: Option<i64>,
    pub last_success_at: Option<i64>,
    pub last_state_change_at: i64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub successful_requests: u64,
    pub rejected_requests: u64,
}

impl CircuitRecord {
    /// Fresh closed record with zeroed counters
    pub fn new(name: impl Into<String>, now_ms: i64) -> Self {
        Self {
            name: name.into(),
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            last_failure_at: None,
            last_success_at: None,
            last_state_change_at: now_ms,
            total_requests: 0,
            failed_requests: 0,
            successful_requests: 0,
            rejected_requests: 0,
        }
    }

    /// Move to `to`, restarting the half-open success streak.
    ///
    /// Entering CLOSED also clears the failure count.
    pub fn transition(&mut self, to: CircuitState, now_ms: i64) {
        self.state = to;
        self.last_state_change_at = now_ms;
        self.successes = 0;
        if to == CircuitState::Closed {
            self.failures = 0;
        }
    }

    /// Millis spent in the current state (never negative under clock skew)
    pub fn time_in_state_ms(&self, now_ms: i64) -> u64 {
        now_ms.saturating_sub(self.last_state_change_at).max(0) as u64
    }
}

// =============================================================================
// Circuit Metrics
// =============================================================================

/// Read-only view of a circuit for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    /// RFC 3339
    pub last_failure_at: Option<String>,
    /// RFC 3339
    pub last_success_at: Option<String>,
    /// RFC 3339
    pub last_state_change_at: Option<String>,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub successful_requests: u64,
    pub rejected_requests: u64,
}

fn iso(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl From<&CircuitRecord> for CircuitMetrics {
    fn from(record: &CircuitRecord) -> Self {
        Self {
            name: record.name.clone(),
            state: record.state,
            failures: record.failures,
            successes: record.successes,
            last_failure_at: record.last_failure_at.and_then(iso),
            last_success_at: record.last_success_at.and_then(iso),
            last_state_change_at: iso(record.last_state_change_at),
            total_requests: record.total_requests,
            failed_requests: record.failed_requests,
            successful_requests: record.successful_requests,
            rejected_requests: record.rejected_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing() {
        assert_eq!("closed".parse::<CircuitState>().unwrap(), CircuitState::Closed);
        assert_eq!("OPEN".parse::<CircuitState>().unwrap(), CircuitState::Open);
        assert_eq!("half-open".parse::<CircuitState>().unwrap(), CircuitState::HalfOpen);
        assert_eq!("HALF_OPEN".parse::<CircuitState>().unwrap(), CircuitState::HalfOpen);
        assert!("ajar".parse::<CircuitState>().is_err());
    }

    #[test]
    fn test_record_wire_format() {
        let mut record = CircuitRecord::new("database", 1_736_899_200_000);
        record.transition(CircuitState::HalfOpen, 1_736_899_230_000);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"], "HALF_OPEN");
        assert_eq!(json["lastStateChangeAt"], 1_736_899_230_000i64);
        assert_eq!(json["rejectedRequests"], 0);
    }

    #[test]
    fn test_transition_to_closed_clears_counters() {
        let mut record = CircuitRecord::new("email", 0);
        record.failures = 4;
        record.successes = 1;

        record.transition(CircuitState::Open, 10);
        assert_eq!(record.failures, 4);
        assert_eq!(record.successes, 0);

        record.transition(CircuitState::Closed, 20);
        assert_eq!(record.failures, 0);
        assert_eq!(record.last_state_change_at, 20);
        assert_eq!(record.time_in_state_ms(15), 0);
        assert_eq!(record.time_in_state_ms(120), 100);
    }

    #[test]
    fn test_metrics_iso_timestamps() {
        let mut record = CircuitRecord::new("database", 1_736_899_200_000);
        record.last_failure_at = Some(1_736_899_200_500);

        let metrics = CircuitMetrics::from(&record);
        assert_eq!(
            metrics.last_state_change_at.as_deref(),
            Some("2025-01-15T00:00:00.000Z")
        );
        assert_eq!(
            metrics.last_failure_at.as_deref(),
            Some("2025-01-15T00:00:00.500Z")
        );
        assert_eq!(metrics.last_success_at, None);
    }
}
