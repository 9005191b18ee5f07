//! Observability skeleton (§4.1, §4.7): structured events emitted by the
//! resilience primitives as they transition state, so callers can wire in
//! counters/histograms/spans without threading ad-hoc callbacks through
//! every policy.
//!
//! Each primitive accepts an optional [`TelemetrySink`] at construction time
//! (`with_telemetry`) and emits a [`PolicyEvent`] at every state transition
//! described in §4.1: circuit breaker open/half-open/close, retry attempt
//! and exhaustion, bulkhead acquire/reject, and timeout expiry. Emission is
//! best-effort and never blocks or fails the call it instruments — a sink
//! is a pure observer.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Consumes [`PolicyEvent`]s emitted by the resilience primitives.
///
/// Implementations must not block the caller for any meaningful duration —
/// `emit` runs inline on the hot path of whichever primitive produced the
/// event.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: PolicyEvent);
}

/// Events emitted during policy execution (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyEvent {
    Retry(RetryEvent),
    CircuitBreaker(CircuitBreakerEvent),
    Bulkhead(BulkheadEvent),
    Timeout(TimeoutEvent),
    RateLimiter(RateLimiterEvent),
    Request(RequestOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    /// A retry attempt is about to be made, after the given backoff delay.
    Attempt { attempt: usize, delay: Duration },
    /// All retry attempts have been exhausted.
    Exhausted { total_attempts: usize, total_duration: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerEvent {
    /// Transitioned to `OPEN`; `failure_count` is the count that tripped it.
    Opened { failure_count: usize },
    /// Transitioned to `HALF_OPEN`; a probe request is being let through.
    HalfOpen,
    /// Transitioned to `CLOSED`.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkheadEvent {
    Acquired { active_count: usize, max_concurrency: usize },
    Rejected { active_count: usize, max_concurrency: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    Occurred { timeout: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimiterEvent {
    Admitted,
    Rejected { retry_after: Option<Duration> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success { duration: Duration },
    Failure { duration: Duration },
}

impl fmt::Display for PolicyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEvent::Retry(e) => write!(f, "Retry::{}", e),
            PolicyEvent::CircuitBreaker(e) => write!(f, "CircuitBreaker::{}", e),
            PolicyEvent::Bulkhead(e) => write!(f, "Bulkhead::{}", e),
            PolicyEvent::Timeout(e) => write!(f, "Timeout::{}", e),
            PolicyEvent::RateLimiter(e) => write!(f, "RateLimiter::{}", e),
            PolicyEvent::Request(e) => write!(f, "Request::{}", e),
        }
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::Attempt { attempt, delay } => {
                write!(f, "Attempt(#{attempt}, delay={delay:?})")
            }
            RetryEvent::Exhausted { total_attempts, total_duration } => {
                write!(f, "Exhausted(attempts={total_attempts}, duration={total_duration:?})")
            }
        }
    }
}

impl fmt::Display for CircuitBreakerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerEvent::Opened { failure_count } => {
                write!(f, "Opened(failures={failure_count})")
            }
            CircuitBreakerEvent::HalfOpen => write!(f, "HalfOpen"),
            CircuitBreakerEvent::Closed => write!(f, "Closed"),
        }
    }
}

impl fmt::Display for BulkheadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkheadEvent::Acquired { active_count, max_concurrency } => {
                write!(f, "Acquired({active_count}/{max_concurrency})")
            }
            BulkheadEvent::Rejected { active_count, max_concurrency } => {
                write!(f, "Rejected({active_count}/{max_concurrency})")
            }
        }
    }
}

impl fmt::Display for TimeoutEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutEvent::Occurred { timeout } => write!(f, "Occurred(timeout={timeout:?})"),
        }
    }
}

impl fmt::Display for RateLimiterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimiterEvent::Admitted => write!(f, "Admitted"),
            RateLimiterEvent::Rejected { retry_after } => {
                write!(f, "Rejected(retry_after={retry_after:?})")
            }
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOutcome::Success { duration } => write!(f, "Success(duration={duration:?})"),
            RequestOutcome::Failure { duration } => write!(f, "Failure(duration={duration:?})"),
        }
    }
}

/// Discards every event. The default when no sink is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: PolicyEvent) {}
}

/// Forwards every event to `tracing` at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl TelemetrySink for LoggingSink {
    fn emit(&self, event: PolicyEvent) {
        tracing::info!(event = %event, "policy event");
    }
}

/// Collects every event into memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct InMemorySink {
    events: Mutex<Vec<PolicyEvent>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far, in emission order.
    pub fn events(&self) -> Vec<PolicyEvent> {
        self.events.lock().expect("InMemorySink mutex poisoned").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("InMemorySink mutex poisoned").clear();
    }
}

impl TelemetrySink for InMemorySink {
    fn emit(&self, event: PolicyEvent) {
        self.events.lock().expect("InMemorySink mutex poisoned").push(event);
    }
}
