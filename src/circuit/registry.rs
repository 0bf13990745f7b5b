//! Named Circuit Registry
//!
//! Circuits represent shared downstream dependencies, so call sites look
//! them up by name instead of constructing breakers ad hoc. The registry is
//! built once at process start.

use crate::circuit::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::circuit::state::CircuitMetrics;
use crate::error::{Error, Result};
use crate::store::KvStoreRef;
use futures::future::try_join_all;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// System-of-record database
pub const DATABASE_CIRCUIT: &str = "database";

/// Transactional email provider
pub const EMAIL_CIRCUIT: &str = "email";

/// Document OCR / capture processing
pub const DOCUMENT_OCR_CIRCUIT: &str = "document-ocr";

/// Payroll provider synchronization
pub const PAYROLL_SYNC_CIRCUIT: &str = "payroll-sync";

/// Registry of named, pre-configured circuits
pub struct CircuitRegistry {
    store: KvStoreRef,
    circuits: RwLock<BTreeMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitRegistry {
    /// Empty registry
    pub fn new(store: KvStoreRef) -> Self {
        Self {
            store,
            circuits: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry holding the standard dependency circuits
    pub fn with_defaults(store: KvStoreRef) -> Self {
        let registry = Self::new(store);
        for (name, config) in Self::default_circuits() {
            registry.register(name, config);
        }
        registry
    }

    /// Standard circuits and their tuning
    pub fn default_circuits() -> Vec<(&'static str, CircuitBreakerConfig)> {
        let base = CircuitBreakerConfig::from_env();
        vec![
            (DATABASE_CIRCUIT, base.clone()),
            (
                EMAIL_CIRCUIT,
                base.clone()
                    .failure_threshold(3)
                    .reset_timeout(Duration::from_secs(60)),
            ),
            (
                DOCUMENT_OCR_CIRCUIT,
                base.clone()
                    .failure_threshold(3)
                    .success_threshold(1)
                    .reset_timeout(Duration::from_secs(60)),
            ),
            (
                PAYROLL_SYNC_CIRCUIT,
                base.reset_timeout(Duration::from_secs(120)),
            ),
        ]
    }

    /// Register (or replace) a circuit
    pub fn register(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(name, self.store.clone(), config));
        self.circuits
            .write()
            .insert(name.to_string(), breaker.clone());

        debug!(circuit = %name, "Registered circuit breaker");
        breaker
    }

    /// Look up a circuit by name
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuits.read().get(name).cloned()
    }

    /// Look up a circuit, failing if it was never registered
    pub fn require(&self, name: &str) -> Result<Arc<CircuitBreaker>> {
        self.get(name).ok_or_else(|| Error::CircuitNotFound {
            name: name.to_string(),
        })
    }

    /// Registered circuit names, sorted
    pub fn names(&self) -> Vec<String> {
        self.circuits.read().keys().cloned().collect()
    }

    /// Metrics for every registered circuit, sorted by name
    pub async fn all_metrics(&self) -> Result<Vec<CircuitMetrics>> {
        // Clone out so no lock is held across awaits
        let breakers: Vec<Arc<CircuitBreaker>> = self.circuits.read().values().cloned().collect();
        try_join_all(breakers.iter().map(|b| b.metrics())).await
    }
}
