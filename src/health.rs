//! Process-level health aggregation (§4.7, §9 "legitimate process-wide
//! states"): tracks each registered Worker's last-known [`Worker::health`]
//! boolean and derives a single "ready" signal once every registered Worker
//! has reported `STARTED`-equivalent health at least once.

use std::collections::HashMap;
use std::sync::Mutex;

/// A point-in-time health snapshot for one Worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerHealth {
    pub healthy: bool,
    pub reported: bool,
}

impl Default for WorkerHealth {
    fn default() -> Self {
        Self { healthy: false, reported: false }
    }
}

/// Aggregates per-Worker health snapshots into a single readiness signal.
/// Guarded by a plain mutex — updates are infrequent (one per health poll)
/// and readers never block producers for long.
#[derive(Default)]
pub struct HealthRegistry {
    workers: Mutex<HashMap<String, WorkerHealth>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh health snapshot for `name`.
    pub fn report(&self, name: impl Into<String>, healthy: bool) {
        self.workers
            .lock()
            .unwrap()
            .insert(name.into(), WorkerHealth { healthy, reported: true });
    }

    /// Register a Worker name with no health reported yet, so it counts
    /// against readiness even before its first health poll.
    pub fn register(&self, name: impl Into<String>) {
        self.workers.lock().unwrap().entry(name.into()).or_default();
    }

    pub fn snapshot(&self) -> Vec<(String, WorkerHealth)> {
        let map = self.workers.lock().unwrap();
        let mut entries: Vec<(String, WorkerHealth)> =
            map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Process-level readiness: every registered Worker has reported health
    /// at least once, and every reported health is `true`.
    pub fn ready(&self) -> bool {
        let map = self.workers.lock().unwrap();
        !map.is_empty() && map.values().all(|h| h.reported && h.healthy)
    }
}
