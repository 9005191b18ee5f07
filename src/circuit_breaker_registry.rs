//! Registry for managing named circuit breakers.
//!
//! Allows global access and control (reset/inspection) of circuit breakers by
//! id — the "resilience primitive registries (for introspection)" process-wide
//! state permitted by the design notes (§9).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::circuit_breaker::{CircuitBreakerPolicy, CircuitState};

/// Handle to reset/query a circuit breaker instance registered under a name.
/// Cheap to clone — wraps the same `Arc`-backed state as the live breaker.
pub type CircuitBreakerHandle = CircuitBreakerPolicy;

/// Registry keyed by breaker id (conventionally the Worker name).
#[derive(Default, Clone)]
pub struct CircuitBreakerRegistry {
    inner: Arc<Mutex<HashMap<String, CircuitBreakerHandle>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breaker instance under `id`. If an entry already exists
    /// for that id it is overwritten.
    pub fn register(&self, id: impl Into<String>, breaker: CircuitBreakerHandle) {
        self.inner.lock().unwrap().insert(id.into(), breaker);
    }

    /// Retrieve the live handle registered under `id`.
    pub fn get(&self, id: &str) -> Option<CircuitBreakerHandle> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    /// Force-close a registered breaker by id. Returns an error if the id is
    /// not registered.
    pub fn reset(&self, id: &str) -> Result<(), String> {
        match self.get(id) {
            Some(handle) => {
                handle.reset();
                Ok(())
            }
            None => Err(format!("breaker id not found: {id}")),
        }
    }

    /// Convenience: create, register, and return a fresh breaker for `id`
    /// with the given failure threshold and reset duration.
    pub fn register_new(&self, id: impl Into<String>, failure_threshold: usize, reset: Duration) -> CircuitBreakerHandle {
        let breaker = CircuitBreakerPolicy::new(failure_threshold, reset);
        self.register(id, breaker.clone());
        breaker
    }

    /// Snapshot of all breaker states (id -> state), sorted by id.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let map = self.inner.lock().unwrap();
        let mut entries: Vec<(String, CircuitState)> =
            map.iter().map(|(k, v)| (k.clone(), v.current_state())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
