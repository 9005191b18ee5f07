//! The Smart Dispatch Queue (§4.3): the heart of the core. A per-Waypoint
//! barrier that reconciles concurrent Worker completions against soft/hard
//! deadlines and yields one of four terminal statuses.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::Notify;

use crate::artifact::Artifact;

/// Terminal (or pre-terminal) status of a dispatch (§3 "Dispatch metrics").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Waiting,
    Complete,
    SoftDegraded,
    HardDegraded,
    Failed,
}

/// Errors constructing a [`SmartDispatchQueue`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchQueueConfigError {
    #[error("expected worker count must be >= 1")]
    ZeroExpected,
    #[error("hard deadline ({hard:?}) must be greater than soft deadline ({soft:?})")]
    HardNotAfterSoft { soft: Duration, hard: Duration },
    #[error("soft deadline must be > 0")]
    ZeroSoftDeadline,
}

/// Configuration for one [`SmartDispatchQueue`] (§4.3).
#[derive(Debug, Clone)]
pub struct DispatchQueueConfig {
    pub expected: usize,
    pub soft_deadline: Duration,
    pub hard_deadline: Duration,
    pub soft_min_successes: usize,
    pub hard_min_successes: usize,
}

impl DispatchQueueConfig {
    /// `soft_min_successes` defaults to `E - 1`, `hard_min_successes` to `1`.
    pub fn new(expected: usize, soft_deadline: Duration, hard_deadline: Duration) -> Self {
        Self {
            expected,
            soft_deadline,
            hard_deadline,
            soft_min_successes: expected.saturating_sub(1).max(1).min(expected),
            hard_min_successes: 1,
        }
    }

    pub fn with_soft_min_successes(mut self, m: usize) -> Self {
        self.soft_min_successes = m;
        self
    }

    pub fn with_hard_min_successes(mut self, m: usize) -> Self {
        self.hard_min_successes = m;
        self
    }

    fn validate(&self) -> Result<(), DispatchQueueConfigError> {
        if self.expected == 0 {
            return Err(DispatchQueueConfigError::ZeroExpected);
        }
        if self.soft_deadline.is_zero() {
            return Err(DispatchQueueConfigError::ZeroSoftDeadline);
        }
        if self.hard_deadline <= self.soft_deadline {
            return Err(DispatchQueueConfigError::HardNotAfterSoft {
                soft: self.soft_deadline,
                hard: self.hard_deadline,
            });
        }
        Ok(())
    }
}

/// Per-Waypoint dispatch metrics (§3). `succeeded_ids ∩ failed_ids = ∅` in
/// the reported metrics even though the internal maps may transiently both
/// hold an entry for the same Worker id (§4.3 invariants) — a Worker that
/// ever produced a usable Artifact is reported as succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchMetrics {
    pub start: SystemTime,
    pub end: Option<SystemTime>,
    pub status: DispatchStatus,
    pub expected_count: usize,
    pub succeeded_ids: Vec<String>,
    pub failed_ids: Vec<String>,
    pub wait_duration_ms: u64,
}

impl DispatchMetrics {
    pub fn received_count(&self) -> usize {
        self.succeeded_ids.len() + self.failed_ids.len()
    }
}

/// The only terminal that raises: the queue reached a terminal decision with
/// no usable successes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("dispatch for waypoint produced no usable results after {0:?}", .metrics.wait_duration_ms)]
pub struct NoResults {
    pub metrics: DispatchMetrics,
}

type WaitOutcome = Result<(Vec<(String, Artifact)>, DispatchMetrics), NoResults>;

struct State {
    successes: HashMap<String, Artifact>,
    failures: HashMap<String, String>,
    terminal: Option<DispatchStatus>,
    finalized: Option<WaitOutcome>,
    waited: bool,
}

impl State {
    fn n_tot_union(&self) -> usize {
        let mut keys: HashSet<&str> = self.successes.keys().map(|s| s.as_str()).collect();
        keys.extend(self.failures.keys().map(|s| s.as_str()));
        keys.len()
    }
}

enum Evaluation {
    Terminal(DispatchStatus),
    WaitUntil(Duration),
}

/// One Waypoint's dispatch barrier, created fresh per dispatch and owned by
/// it (§9 redesign note). Cheap to clone — all state is `Arc`-shared.
#[derive(Clone)]
pub struct SmartDispatchQueue {
    config: std::sync::Arc<DispatchQueueConfig>,
    state: std::sync::Arc<Mutex<State>>,
    notify: std::sync::Arc<Notify>,
    start_instant: Instant,
    start_system: SystemTime,
}

impl SmartDispatchQueue {
    pub fn new(config: DispatchQueueConfig) -> Result<Self, DispatchQueueConfigError> {
        config.validate()?;
        Ok(Self {
            config: std::sync::Arc::new(config),
            state: std::sync::Arc::new(Mutex::new(State {
                successes: HashMap::new(),
                failures: HashMap::new(),
                terminal: None,
                finalized: None,
                waited: false,
            })),
            notify: std::sync::Arc::new(Notify::new()),
            start_instant: Instant::now(),
            start_system: SystemTime::now(),
        })
    }

    fn elapsed(&self) -> Duration {
        self.start_instant.elapsed()
    }

    /// Record a successful Worker completion. A duplicate call for the same
    /// `worker_id` overwrites the previously stored Artifact. No-op once the
    /// queue has already reached (and cached) its terminal status.
    pub fn submit_success(&self, worker_id: impl Into<String>, artifact: Artifact) {
        {
            let mut state = self.state.lock().unwrap();
            state.successes.insert(worker_id.into(), artifact);
        }
        self.notify.notify_waiters();
    }

    /// Record a failed Worker completion (including resilience-envelope
    /// failures such as `CircuitOpen` or `Timeout`, reported via their stable
    /// short error-kind name per §7).
    pub fn submit_failure(&self, worker_id: impl Into<String>, error_text: impl Into<String>) {
        {
            let mut state = self.state.lock().unwrap();
            state.failures.insert(worker_id.into(), error_text.into());
        }
        self.notify.notify_waiters();
    }

    fn evaluate(&self, state: &State) -> Evaluation {
        let n_succ = state.successes.len();
        let n_tot = state.n_tot_union();
        let elapsed = self.elapsed();
        let e = self.config.expected;

        if n_tot >= e {
            return if n_succ >= e {
                Evaluation::Terminal(DispatchStatus::Complete)
            } else if n_succ >= self.config.soft_min_successes {
                Evaluation::Terminal(DispatchStatus::SoftDegraded)
            } else if n_succ >= self.config.hard_min_successes {
                Evaluation::Terminal(DispatchStatus::HardDegraded)
            } else {
                Evaluation::Terminal(DispatchStatus::Failed)
            };
        }

        if elapsed >= self.config.hard_deadline {
            return if n_succ >= self.config.hard_min_successes {
                Evaluation::Terminal(DispatchStatus::HardDegraded)
            } else {
                Evaluation::Terminal(DispatchStatus::Failed)
            };
        }

        if elapsed >= self.config.soft_deadline && n_succ >= self.config.soft_min_successes {
            return Evaluation::Terminal(DispatchStatus::SoftDegraded);
        }

        if n_succ >= self.config.soft_min_successes {
            Evaluation::WaitUntil(self.config.soft_deadline)
        } else {
            Evaluation::WaitUntil(self.config.hard_deadline)
        }
    }

    fn finalize(&self, state: &mut State, status: DispatchStatus) -> WaitOutcome {
        state.terminal = Some(status);
        let end = SystemTime::now();
        let wait_duration_ms = self.elapsed().as_millis() as u64;

        let succeeded_ids: Vec<String> = state.successes.keys().cloned().collect();
        let failed_ids: Vec<String> = state
            .failures
            .keys()
            .filter(|id| !state.successes.contains_key(*id))
            .cloned()
            .collect();

        let metrics = DispatchMetrics {
            start: self.start_system,
            end: Some(end),
            status,
            expected_count: self.config.expected,
            succeeded_ids,
            failed_ids,
            wait_duration_ms,
        };

        let outcome = if status == DispatchStatus::Failed {
            Err(NoResults { metrics })
        } else {
            let artifacts: Vec<(String, Artifact)> =
                state.successes.iter().map(|(id, a)| (id.clone(), a.clone())).collect();
            Ok((artifacts, metrics))
        };
        state.finalized = Some(outcome.clone());
        outcome
    }

    /// Block until a termination rule fires (§4.3), then return the
    /// candidate Artifacts plus metrics, or a [`NoResults`] error if the
    /// dispatch terminated `FAILED`. Safe to call more than once: subsequent
    /// calls replay the cached outcome rather than recomputing it.
    pub async fn wait_for_results(&self) -> WaitOutcome {
        loop {
            let (already_done, decision) = {
                let mut state = self.state.lock().unwrap();
                state.waited = true;
                if let Some(outcome) = &state.finalized {
                    (Some(outcome.clone()), Evaluation::Terminal(DispatchStatus::Waiting))
                } else {
                    let decision = self.evaluate(&state);
                    if let Evaluation::Terminal(status) = decision {
                        let outcome = self.finalize(&mut state, status);
                        (Some(outcome), Evaluation::Terminal(status))
                    } else {
                        (None, decision)
                    }
                }
            };

            if let Some(outcome) = already_done {
                return outcome;
            }

            if let Evaluation::WaitUntil(target) = decision {
                let remaining = target.saturating_sub(self.elapsed());
                if remaining.is_zero() {
                    continue;
                }
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = tokio::time::sleep(remaining) => {}
                }
            }
        }
    }

    /// Current, possibly pre-terminal, status snapshot — useful for
    /// diagnostics without consuming the wait.
    pub fn status(&self) -> DispatchStatus {
        self.state.lock().unwrap().terminal.unwrap_or(DispatchStatus::Waiting)
    }
}
