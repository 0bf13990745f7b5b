//! Persisted Circuit Breaker
//!
//! Wraps calls to unreliable dependencies. State lives in the shared store
//! under `app:circuit:{name}`, so every stateless handler in every process
//! sees the same circuit.
//!
//! # State Transitions
//! ```text
//! CLOSED    → OPEN:      failures ≥ failure_threshold
//! OPEN      → HALF_OPEN: on the first call after reset_timeout (lazy, no timer)
//! HALF_OPEN → CLOSED:    success_threshold consecutive successes
//! HALF_OPEN → OPEN:      any failure
//! ```
//!
//! The read-modify-write is not atomic. Two concurrent calls can both read
//! the same record and the later write wins; thresholds are tolerances, not
//! exact counters, and the record expires after an hour.

use crate::cache::key::{APP_NAMESPACE, CIRCUIT_SEGMENT};
use crate::circuit::state::{CircuitMetrics, CircuitRecord, CircuitState};
use crate::error::{Error, Result};
use crate::store::KvStoreRef;
use chrono::Utc;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Defaults
// =============================================================================

/// Failures before the circuit opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Half-open successes before the circuit closes
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Cool-down before an open circuit lets a probe through
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 30_000;

/// Reserved for windowed failure-rate strategies; not consulted
pub const DEFAULT_MONITOR_WINDOW_MS: u64 = 60_000;

/// Retention of persisted circuit records
pub const CIRCUIT_STATE_TTL_SECS: u64 = 3600;

/// Storage key for a circuit's record
pub fn circuit_key(name: &str) -> String {
    format!("{}:{}:{}", APP_NAMESPACE, CIRCUIT_SEGMENT, name)
}

// =============================================================================
// Errors
// =============================================================================

/// Rejection issued while a circuit is open
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circuit breaker '{circuit_name}' is open; retry in {remaining_ms}ms")]
pub struct CircuitOpenError {
    pub circuit_name: String,
    /// Cool-down left before a probe is allowed
    pub remaining_ms: u64,
}

/// Outcome of a failed [`CircuitBreaker::execute`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// Rejected without calling the operation
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// The circuit record could not be loaded; the operation did not run
    #[error("Circuit state unavailable: {0}")]
    Store(#[source] Error),

    /// The operation's own error, passed through untouched
    #[error(transparent)]
    Operation(E),
}

impl<E> CircuitError<E> {
    /// Check if the call was rejected by an open circuit
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open(_))
    }

    /// The operation's error, if that is what failed
    pub fn into_operation(self) -> Option<E> {
        match self {
            CircuitError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CircuitError<Error>> for Error {
    fn from(err: CircuitError<Error>) -> Self {
        match err {
            CircuitError::Open(open) => Error::CircuitOpen(open),
            CircuitError::Store(e) | CircuitError::Operation(e) => e,
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Decides whether an operation error counts against the circuit
pub type FailureClassifier = Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync>;

/// Per-circuit thresholds and failure classification
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
    /// Reserved; the transition logic uses running counters only
    pub monitor_window: Duration,
    /// Errors for which this returns false leave the circuit untouched
    pub is_failure: FailureClassifier,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            reset_timeout: Duration::from_millis(DEFAULT_RESET_TIMEOUT_MS),
            monitor_window: Duration::from_millis(DEFAULT_MONITOR_WINDOW_MS),
            is_failure: Arc::new(|_: &(dyn std::error::Error + 'static)| true),
        }
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("monitor_window", &self.monitor_window)
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerConfig {
    /// Create CircuitBreakerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `ESTA_CIRCUIT_FAILURE_THRESHOLD`: failures before opening (default: 5)
    /// - `ESTA_CIRCUIT_SUCCESS_THRESHOLD`: half-open successes to close (default: 2)
    /// - `ESTA_CIRCUIT_RESET_TIMEOUT_MS`: how long the circuit stays open (default: 30000)
    pub fn from_env() -> Self {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
        }

        let defaults = Self::default();
        Self {
            failure_threshold: parsed("ESTA_CIRCUIT_FAILURE_THRESHOLD")
                .unwrap_or(defaults.failure_threshold),
            success_threshold: parsed("ESTA_CIRCUIT_SUCCESS_THRESHOLD")
                .unwrap_or(defaults.success_threshold),
            reset_timeout: parsed("ESTA_CIRCUIT_RESET_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reset_timeout),
            ..defaults
        }
    }

    /// Set the failure threshold
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the half-open success threshold
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the open-state cool-down
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set which errors count as failures
    pub fn classify_failures<F>(mut self, is_failure: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.is_failure = Arc::new(is_failure);
        self
    }
}

// =============================================================================
// Circuit Breaker
// =============================================================================

#[inline]
fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A named circuit whose state is persisted in the shared store
pub struct CircuitBreaker {
    name: String,
    key: String,
    config: CircuitBreakerConfig,
    store: KvStoreRef,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker for `name` backed by `store`
    pub fn new(name: impl Into<String>, store: KvStoreRef, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        Self {
            key: circuit_key(&name),
            name,
            config,
            store,
        }
    }

    /// Circuit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Circuit configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Load the record, defaulting to a fresh closed one.
    ///
    /// An unreadable record is replaced rather than surfaced.
    async fn load(&self) -> Result<CircuitRecord> {
        let Some(raw) = self.store.get(&self.key).await? else {
            return Ok(CircuitRecord::new(&self.name, now_ms()));
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!(circuit = %self.name, error = %e, "Discarding unreadable circuit record");
                Ok(CircuitRecord::new(&self.name, now_ms()))
            }
        }
    }

    async fn save(&self, record: &CircuitRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.store
            .set_with_ttl(&self.key, &payload, CIRCUIT_STATE_TTL_SECS)
            .await
    }

    /// Persist after the operation already ran; its outcome wins over a write error
    async fn save_best_effort(&self, record: &CircuitRecord) {
        if let Err(e) = self.save(record).await {
            warn!(circuit = %self.name, error = %e, "Failed to persist circuit state");
        }
    }

    /// Run `operation` through the circuit.
    ///
    /// Rejects with [`CircuitError::Open`] while open. Errors the classifier
    /// excludes come back as [`CircuitError::Operation`] with no effect on
    /// the circuit.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> std::result::Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let now = now_ms();
        let mut record = self.load().await.map_err(CircuitError::Store)?;

        if record.state == CircuitState::Open {
            let reset_ms = self.config.reset_timeout.as_millis() as u64;
            let elapsed = record.time_in_state_ms(now);

            if elapsed < reset_ms {
                record.rejected_requests += 1;
                record.total_requests += 1;
                self.save_best_effort(&record).await;

                let remaining_ms = reset_ms - elapsed;
                debug!(circuit = %self.name, remaining_ms = remaining_ms, "Circuit open, rejecting call");
                return Err(CircuitError::Open(CircuitOpenError {
                    circuit_name: self.name.clone(),
                    remaining_ms,
                }));
            }

            record.transition(CircuitState::HalfOpen, now);
            // Persist now so the transition survives a non-failure error below
            self.save_best_effort(&record).await;
            info!(circuit = %self.name, "Circuit half-open, probing dependency");
        }

        record.total_requests += 1;

        match operation().await {
            Ok(value) => {
                let done = now_ms();
                record.successful_requests += 1;
                record.last_success_at = Some(done);

                match record.state {
                    CircuitState::HalfOpen => {
                        record.successes += 1;
                        if record.successes >= self.config.success_threshold {
                            record.transition(CircuitState::Closed, done);
                            info!(circuit = %self.name, "Circuit closed, dependency recovered");
                        }
                    }
                    CircuitState::Closed => record.failures = 0,
                    CircuitState::Open => {}
                }

                self.save_best_effort(&record).await;
                Ok(value)
            }
            Err(error) => {
                let classified: &(dyn std::error::Error + 'static) = &error;
                if !(self.config.is_failure)(classified) {
                    debug!(circuit = %self.name, error = %error, "Error not counted as circuit failure");
                    return Err(CircuitError::Operation(error));
                }

                let done = now_ms();
                record.failed_requests += 1;
                record.failures += 1;
                record.last_failure_at = Some(done);

                match record.state {
                    CircuitState::HalfOpen => {
                        record.transition(CircuitState::Open, done);
                        warn!(circuit = %self.name, error = %error, "Probe failed, circuit re-opened");
                    }
                    CircuitState::Closed
                        if record.failures >= self.config.failure_threshold.max(1) =>
                    {
                        record.transition(CircuitState::Open, done);
                        warn!(
                            circuit = %self.name,
                            failures = record.failures,
                            error = %error,
                            "Failure threshold reached, circuit opened"
                        );
                    }
                    _ => {}
                }

                self.save_best_effort(&record).await;
                Err(CircuitError::Operation(error))
            }
        }
    }

    /// Current persisted state
    pub async fn state(&self) -> Result<CircuitState> {
        Ok(self.load().await?.state)
    }

    /// Snapshot of the persisted record
    pub async fn metrics(&self) -> Result<CircuitMetrics> {
        Ok(CircuitMetrics::from(&self.load().await?))
    }

    /// Administrative override of the state; forcing CLOSED clears failures
    pub async fn force_state(&self, state: CircuitState) -> Result<()> {
        let mut record = self.load().await?;
        let previous = record.state;
        record.transition(state, now_ms());
        self.save(&record).await?;

        info!(circuit = %self.name, from = %previous, to = %state, "Circuit state forced");
        Ok(())
    }

    /// Delete the persisted record; the next access starts CLOSED with zero counters
    pub async fn reset(&self) -> Result<()> {
        self.store.delete(&[self.key.clone()]).await?;
        info!(circuit = %self.name, "Circuit reset");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
