//! Persisted Circuit Breakers
//!
//! Fail-fast protection for calls to external dependencies. Each named
//! circuit keeps its state record in the shared key-value store, so every
//! process talking to the same store observes the same circuit.
//!
//! ```text
//!            failures >= failure_threshold
//!   CLOSED ─────────────────────────────────▶ OPEN
//!     ▲                                        │
//!     │ successes >= success_threshold         │ reset_timeout elapsed
//!     │                                        ▼
//!     └──────────────────────────────────── HALF_OPEN
//!                  any failure ──────────────▶ OPEN
//! ```

pub mod breaker;
pub mod registry;
pub mod state;

pub use breaker::{
    circuit_key, CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitOpenError,
    FailureClassifier, CIRCUIT_STATE_TTL_SECS,
};
pub use registry::{
    CircuitRegistry, DATABASE_CIRCUIT, DOCUMENT_OCR_CIRCUIT, EMAIL_CIRCUIT, PAYROLL_SYNC_CIRCUIT,
};
pub use state::{CircuitMetrics, CircuitRecord, CircuitState};
