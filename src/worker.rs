//! The Worker contract (§4.2): a polymorphic content producer with an
//! explicit lifecycle, invoked through the resilience envelope.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::artifact::Artifact;
use crate::content_kind::ContentKind;
use crate::profile::Profile;
use crate::waypoint::Waypoint;

/// Immutable description of a Worker, registered at start-of-day.
#[derive(Debug, Clone)]
pub struct WorkerMetadata {
    pub name: String,
    pub version: String,
    pub declared_kind: ContentKind,
    pub priority: u32,
    pub timeout: Duration,
    pub max_retries: usize,
    pub circuit_failure_threshold: usize,
    pub circuit_reset: Duration,
    pub capability_tags: HashSet<String>,
}

impl WorkerMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            declared_kind: kind,
            priority: 100,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            circuit_failure_threshold: 5,
            circuit_reset: Duration::from_secs(30),
            capability_tags: HashSet::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.capability_tags.insert(tag.into());
        self
    }
}

/// Runtime lifecycle state of a Worker (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Unloaded,
    Loaded,
    Configured,
    Started,
    Stopped,
    Failed,
}

impl WorkerState {
    /// Whether a given verb is legal from this state. `execute` is legal
    /// only in `Started`.
    fn can_transition(self, to: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, to),
            (Unloaded, Loaded)
                | (Loaded, Configured)
                | (Configured, Started)
                | (Started, Stopped)
                | (Stopped, Configured)
                | (Stopped, Unloaded)
                | (Configured, Unloaded)
                | (Started, Unloaded)
                | (_, Failed)
        )
    }
}

/// Errors from the Worker lifecycle and `execute` contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkerError {
    #[error("worker configuration rejected: {0}")]
    ConfigInvalid(String),
    #[error("worker {name} is not started (state: {state:?})")]
    NotStarted { name: String, state: WorkerState },
    #[error("illegal worker state transition: {from:?} -> {to:?}")]
    IllegalTransition { from: WorkerState, to: WorkerState },
    #[error("worker execution failed: {0}")]
    ExecutionFailed(String),
}

/// Tracks a Worker's lifecycle state and enforces legal transitions.
/// Embedded in concrete Worker implementations via composition.
#[derive(Debug, Clone)]
pub struct WorkerLifecycle {
    name: String,
    state: WorkerState,
}

impl WorkerLifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: WorkerState::Unloaded }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, to: WorkerState) -> Result<(), WorkerError> {
        if to == WorkerState::Failed || self.state.can_transition(to) {
            self.state = to;
            Ok(())
        } else {
            Err(WorkerError::IllegalTransition { from: self.state, to })
        }
    }

    pub fn load(&mut self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Loaded)
    }

    pub fn configure(&mut self) -> Result<(), WorkerError> {
        if self.state == WorkerState::Stopped {
            return self.transition(WorkerState::Configured);
        }
        self.transition(WorkerState::Configured)
    }

    pub fn start(&mut self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Started)
    }

    pub fn stop(&mut self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Stopped)
    }

    pub fn destroy(&mut self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Unloaded)
    }

    pub fn fail(&mut self) {
        self.state = WorkerState::Failed;
    }

    pub fn require_started(&self) -> Result<(), WorkerError> {
        if self.state == WorkerState::Started {
            Ok(())
        } else {
            Err(WorkerError::NotStarted { name: self.name.clone(), state: self.state })
        }
    }
}

/// Context passed into a Worker's `execute` call by the Orchestrator: the
/// Waypoint plus the active Profile, decoupling Workers from any shared
/// mutable Profile reference (§9, cyclic-reference redesign note).
#[derive(Debug, Clone)]
pub struct WorkerContext<'a> {
    pub waypoint: &'a Waypoint,
    pub profile: &'a Profile,
}

/// A polymorphic content-producing unit. Implementations must not retry,
/// time-limit, or rate-limit themselves — the resilience envelope does.
#[async_trait]
pub trait Worker: Send + Sync {
    fn metadata(&self) -> &WorkerMetadata;

    async fn configure(&self, config: &serde_json::Value) -> Result<(), WorkerError>;

    async fn start(&self) -> Result<(), WorkerError>;

    async fn stop(&self) -> Result<(), WorkerError>;

    async fn destroy(&self) -> Result<(), WorkerError>;

    /// Cheap boolean health snapshot.
    fn health(&self) -> bool;

    /// The single productive call. Returns `Ok(None)` to signal "nothing
    /// relevant found" — that is not itself a failure.
    async fn execute(&self, ctx: WorkerContext<'_>) -> Result<Option<Artifact>, WorkerError>;
}
