//! Circuit breaker implementation with lock-free atomics

use crate::telemetry::{CircuitBreakerEvent, PolicyEvent, TelemetrySink};
use crate::ResilienceError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Clock abstraction so circuit breaker timing can be faked in tests
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()`
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub recovery_timeout: Duration,
    pub half_open_max_calls: usize,
    /// Consecutive half-open successes required to close the circuit (§4.1 `S`).
    pub success_threshold: usize,
}

impl CircuitBreakerConfig {
    pub fn disabled() -> Self {
        Self {
            failure_threshold: usize::MAX,
            recovery_timeout: Duration::from_secs(0),
            half_open_max_calls: usize::MAX,
            success_threshold: 1,
        }
    }
}

struct CircuitBreakerState {
    state: AtomicU8,
    failure_count: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_calls: AtomicUsize,
    half_open_successes: AtomicUsize,
}

impl CircuitBreakerState {
    fn fresh() -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicUsize::new(0),
            opened_at_millis: AtomicU64::new(0),
            half_open_calls: AtomicUsize::new(0),
            half_open_successes: AtomicUsize::new(0),
        }
    }
}

/// Point-in-time counters for a [`CircuitBreakerPolicy`] (§4.1 "exposes a
/// statistics snapshot").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: usize,
    pub half_open_calls: usize,
    pub half_open_successes: usize,
}

#[derive(Clone)]
pub struct CircuitBreakerPolicy {
    state: Arc<CircuitBreakerState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl CircuitBreakerPolicy {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            state: Arc::new(CircuitBreakerState::fresh()),
            config: CircuitBreakerConfig {
                failure_threshold,
                recovery_timeout,
                half_open_max_calls: 1,
                success_threshold: 1,
            },
            clock: Arc::new(MonotonicClock::default()),
            telemetry: None,
        }
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(CircuitBreakerState::fresh()),
            config,
            clock: Arc::new(MonotonicClock::default()),
            telemetry: None,
        }
    }

    /// Attach a sink observing every state transition (§4.1: "State
    /// transitions must be observable via a callback").
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    fn emit(&self, event: CircuitBreakerEvent) {
        if let Some(sink) = &self.telemetry {
            sink.emit(PolicyEvent::CircuitBreaker(event));
        }
    }

    /// Override the clock (useful for deterministic tests)
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_half_open_limit(mut self, limit: usize) -> Self {
        self.config.half_open_max_calls = limit;
        self
    }

    /// Require `threshold` consecutive half-open successes before closing (§4.1 `S`).
    pub fn with_success_threshold(mut self, threshold: usize) -> Self {
        self.config.success_threshold = threshold.max(1);
        self
    }

    /// Current breaker state, for introspection (`CircuitBreakerRegistry`).
    pub fn current_state(&self) -> CircuitState {
        match self.state.state.load(Ordering::Acquire) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Point-in-time counters, for introspection (§4.1).
    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.current_state(),
            failure_count: self.state.failure_count.load(Ordering::Acquire),
            half_open_calls: self.state.half_open_calls.load(Ordering::Acquire),
            half_open_successes: self.state.half_open_successes.load(Ordering::Acquire),
        }
    }

    /// Force the breaker back to `Closed`, clearing all counters.
    pub fn reset(&self) {
        self.state.state.store(STATE_CLOSED, Ordering::Release);
        self.state.failure_count.store(0, Ordering::Release);
        self.state.opened_at_millis.store(0, Ordering::Release);
        self.state.half_open_calls.store(0, Ordering::Release);
        self.state.half_open_successes.store(0, Ordering::Release);
    }

    pub async fn execute<T, E, Fut, Op>(&self, mut operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        // Check state and enforce policy
        loop {
            let current_state = self.state.state.load(Ordering::Acquire);

            match current_state {
                STATE_OPEN => {
                    let opened_at = self.state.opened_at_millis.load(Ordering::Acquire);
                    let now = self.now_millis();
                    let elapsed = now.saturating_sub(opened_at);

                    if elapsed >= self.config.recovery_timeout.as_millis() as u64 {
                        // Try transition to half-open
                        match self.state.state.compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        ) {
                            Ok(_) => {
                                // We won the race - we're the first half-open caller
                                tracing::info!("Circuit breaker → half-open");
                                self.emit(CircuitBreakerEvent::HalfOpen);
                                self.state.half_open_calls.store(1, Ordering::Release);
                                self.state.half_open_successes.store(0, Ordering::Release);
                                break; // Proceed to execute
                            }
                            Err(STATE_HALF_OPEN) => {
                                // Someone else transitioned to half-open
                                // Re-check on next iteration
                                continue;
                            }
                            Err(STATE_CLOSED) => {
                                // Someone else closed it - we're good
                                break;
                            }
                            Err(_) => unreachable!("Invalid state transition"),
                        }
                    } else {
                        // Still in timeout period
                        return Err(ResilienceError::CircuitOpen {
                            failure_count: self.state.failure_count.load(Ordering::Acquire),
                            open_duration: Duration::from_millis(elapsed),
                        });
                    }
                }
                STATE_HALF_OPEN => {
                    // Limit concurrent test requests
                    let current = self.state.half_open_calls.fetch_add(1, Ordering::AcqRel);
                    if current >= self.config.half_open_max_calls {
                        self.state.half_open_calls.fetch_sub(1, Ordering::Release);
                        return Err(ResilienceError::CircuitOpen {
                            failure_count: self.state.failure_count.load(Ordering::Acquire),
                            open_duration: Duration::from_millis(0),
                        });
                    }
                    tracing::debug!(
                        in_flight = current + 1,
                        max = self.config.half_open_max_calls,
                        "Circuit breaker: half-open test request"
                    );
                    break; // Proceed to execute
                }
                STATE_CLOSED => {
                    break; // Normal operation
                }
                _ => unreachable!("Invalid circuit breaker state"),
            }
        }

        // Execute the operation
        let was_half_open = self.state.state.load(Ordering::Acquire) == STATE_HALF_OPEN;
        let result = operation().await;

        // Decrement half-open counter if needed
        if was_half_open {
            self.state.half_open_calls.fetch_sub(1, Ordering::Release);
        }

        // Update state based on result
        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }

        result
    }

    fn on_success(&self) {
        let current = self.state.state.load(Ordering::Acquire);

        match current {
            STATE_HALF_OPEN => {
                let successes = self.state.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold
                    && self
                        .state
                        .state
                        .compare_exchange(
                            STATE_HALF_OPEN,
                            STATE_CLOSED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.state.failure_count.store(0, Ordering::Release);
                    self.state.opened_at_millis.store(0, Ordering::Release);
                    self.state.half_open_successes.store(0, Ordering::Release);
                    tracing::info!("Circuit breaker → closed");
                    self.emit(CircuitBreakerEvent::Closed);
                }
            }
            STATE_CLOSED => {
                self.state.failure_count.store(0, Ordering::Release);
            }
            _ => {}
        }
    }

    fn on_failure(&self) {
        let current = self.state.state.load(Ordering::Acquire);
        let failures = self.state.failure_count.fetch_add(1, Ordering::AcqRel) + 1;

        match current {
            STATE_HALF_OPEN => {
                if self
                    .state
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.state
                        .opened_at_millis
                        .store(self.now_millis(), Ordering::Release);
                    self.state.half_open_successes.store(0, Ordering::Release);
                    tracing::warn!(failures, "Circuit breaker: test failed → open");
                    self.emit(CircuitBreakerEvent::Opened { failure_count: failures });
                }
            }
            STATE_CLOSED => {
                if failures >= self.config.failure_threshold {
                    if self
                        .state
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.state
                            .opened_at_millis
                            .store(self.now_millis(), Ordering::Release);
                        tracing::error!(
                            failures,
                            threshold = self.config.failure_threshold,
                            "Circuit breaker → open"
                        );
                        self.emit(CircuitBreakerEvent::Opened { failure_count: failures });
                    }
                }
            }
            _ => {}
        }
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}
