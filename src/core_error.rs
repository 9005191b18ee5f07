//! The crate-wide error taxonomy (§7): unifies the resilience envelope's
//! generic [`ResilienceError`] with the domain-specific variants that cross
//! Worker, registry, and Orchestrator seams.

use std::time::Duration;

use crate::dispatch_queue::NoResults;
use crate::envelope::EnvelopeError;
use crate::error::ResilienceError;
use crate::selection::SelectionError;
use crate::worker::WorkerError;
use crate::worker_registry::DiscoveryError;

/// A single, crate-wide error type. Most call sites deal with a narrower
/// error (e.g. [`WorkerError`], [`SelectionError`]); `CoreError` exists for
/// the boundaries named in §4.7 — Worker execution and Orchestrator-level
/// operations — where a caller needs one type to match on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("worker configuration rejected: {0}")]
    ConfigInvalid(String),

    #[error("operation attempted on a worker that is not started: {0}")]
    NotStarted(String),

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("all retry attempts exhausted: {0}")]
    RetriesExhausted(String),

    #[error("bulkhead capacity exceeded")]
    BulkheadFull,

    #[error("rate limit exceeded{}", .retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimitExceeded { retry_after: Option<Duration> },

    #[error("dispatch produced no usable results after {wait_duration_ms}ms")]
    NoResults { wait_duration_ms: u64 },

    #[error("circular dependency detected among workers: {0:?}")]
    CircularDependency(Vec<String>),

    #[error("operation cancelled")]
    Cancelled,

    #[error("orchestrator is not running")]
    NotRunning,

    #[error("selection policy error: {0}")]
    Selection(#[from] SelectionError),

    #[error("worker registry discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("envelope configuration error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// A stable, short error-kind name for reporting as a Smart Dispatch
    /// Queue failure record (§7), mirroring [`ResilienceError::kind_name`].
    pub fn kind_name(&self) -> &'static str {
        match self {
            CoreError::ConfigInvalid(_) => "config_invalid",
            CoreError::NotStarted(_) => "not_started",
            CoreError::CircuitOpen => "circuit_open",
            CoreError::Timeout(_) => "timeout",
            CoreError::RetriesExhausted(_) => "retries_exhausted",
            CoreError::BulkheadFull => "bulkhead_full",
            CoreError::RateLimitExceeded { .. } => "rate_limited",
            CoreError::NoResults { .. } => "no_results",
            CoreError::CircularDependency(_) => "circular_dependency",
            CoreError::Cancelled => "cancelled",
            CoreError::NotRunning => "not_running",
            CoreError::Selection(_) => "selection_error",
            CoreError::Discovery(_) => "discovery_error",
            CoreError::Envelope(_) => "envelope_error",
            CoreError::Config(_) => "config_error",
        }
    }
}

impl From<WorkerError> for CoreError {
    fn from(e: WorkerError) -> Self {
        let message = e.to_string();
        match e {
            WorkerError::ConfigInvalid(msg) => CoreError::ConfigInvalid(msg),
            WorkerError::NotStarted { name, .. } => CoreError::NotStarted(name),
            WorkerError::IllegalTransition { .. } => CoreError::ConfigInvalid(message),
            WorkerError::ExecutionFailed(msg) => CoreError::ConfigInvalid(msg),
        }
    }
}

impl<E> From<ResilienceError<E>> for CoreError
where
    E: std::error::Error + Into<CoreError>,
{
    fn from(e: ResilienceError<E>) -> Self {
        match e {
            ResilienceError::Timeout { timeout, .. } => CoreError::Timeout(timeout),
            ResilienceError::Bulkhead { .. } => CoreError::BulkheadFull,
            ResilienceError::CircuitOpen { .. } => CoreError::CircuitOpen,
            ResilienceError::RetryExhausted { failures, .. } => {
                let last = failures.into_iter().last().map(|e| e.to_string()).unwrap_or_default();
                CoreError::RetriesExhausted(last)
            }
            ResilienceError::RateLimited { retry_after } => CoreError::RateLimitExceeded { retry_after },
            ResilienceError::Inner(inner) => inner.into(),
        }
    }
}

impl From<NoResults> for CoreError {
    fn from(e: NoResults) -> Self {
        CoreError::NoResults { wait_duration_ms: e.metrics.wait_duration_ms }
    }
}
