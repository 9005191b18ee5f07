//! The Resilience Envelope (§4.1): the fixed composition order wrapping
//! every Worker invocation — rate limiter, bulkhead, circuit breaker, retry,
//! timeout, then the Worker body itself.
//!
//! Unlike [`crate::stack::ResilienceStack`] (which retries the whole
//! circuit-breaker/bulkhead chain per attempt), the envelope keeps retry
//! *inside* the circuit breaker: a circuit trips on the outcome of a fully
//! retried call, not on each individual attempt.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bulkhead::BulkheadPolicy;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy};
use crate::error::ResilienceError;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::telemetry::TelemetrySink;
use crate::timeout::{TimeoutError, TimeoutPolicy};

/// Errors constructing a [`ResilienceEnvelope`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid envelope timeout: {0}")]
    Timeout(#[from] TimeoutError),
}

/// One Worker's fully composed resilience wrapping. Cheap to clone (every
/// inner policy shares state behind an `Arc`).
#[derive(Clone)]
pub struct ResilienceEnvelope<E> {
    rate_limiter: Option<RateLimiter>,
    bulkhead: BulkheadPolicy,
    circuit_breaker: CircuitBreakerPolicy,
    retry: RetryPolicy<E>,
    timeout: TimeoutPolicy,
}

impl<E> ResilienceEnvelope<E>
where
    E: std::error::Error + Send + Sync + Clone + 'static,
{
    pub fn builder() -> ResilienceEnvelopeBuilder<E> {
        ResilienceEnvelopeBuilder::new()
    }

    /// Run `operation` through rate limiter → bulkhead → circuit breaker →
    /// retry → timeout → `operation`, in that order from outermost to
    /// innermost.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let op_cell = Arc::new(Mutex::new(operation));

        if let Some(limiter) = &self.rate_limiter {
            limiter.try_acquire(1).map_err(|e| ResilienceError::RateLimited {
                retry_after: e.retry_after,
            })?;
        }

        self.bulkhead
            .execute(|| {
                let op = op_cell.clone();
                let circuit_breaker = self.circuit_breaker.clone();
                let retry = self.retry.clone();
                let timeout = self.timeout.clone();
                async move {
                    circuit_breaker
                        .execute(|| {
                            let op = op.clone();
                            let retry = retry.clone();
                            let timeout = timeout.clone();
                            async move {
                                retry
                                    .execute(|| {
                                        let op = op.clone();
                                        let timeout = timeout.clone();
                                        async move {
                                            timeout
                                                .execute(|| {
                                                    let mut op = op.lock().unwrap();
                                                    op()
                                                })
                                                .await
                                        }
                                    })
                                    .await
                            }
                        })
                        .await
                }
            })
            .await
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_ref()
    }
}

pub struct ResilienceEnvelopeBuilder<E> {
    rate_limiter: Option<RateLimiter>,
    bulkhead: Option<BulkheadPolicy>,
    circuit_breaker: Option<CircuitBreakerPolicy>,
    retry: Option<RetryPolicy<E>>,
    timeout: Option<TimeoutPolicy>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl<E> ResilienceEnvelopeBuilder<E>
where
    E: std::error::Error + Send + Sync + Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            rate_limiter: None,
            bulkhead: None,
            circuit_breaker: None,
            retry: None,
            timeout: None,
            telemetry: None,
        }
    }

    /// Attach a sink observing every resilience-primitive state transition in
    /// this envelope (§4.7 observability skeleton). Applied to whichever
    /// bulkhead/circuit-breaker/retry/timeout policy ends up in the built
    /// envelope, including ones supplied explicitly via the other builder
    /// methods.
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn bulkhead(mut self, max_concurrent: usize) -> Self {
        self.bulkhead = Some(BulkheadPolicy::new(max_concurrent));
        self
    }

    pub fn circuit_breaker(mut self, failures: usize, reset: Duration) -> Self {
        self.circuit_breaker = Some(CircuitBreakerPolicy::new(failures, reset));
        self
    }

    pub fn circuit_breaker_with_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(CircuitBreakerPolicy::with_config(config));
        self
    }

    /// Wire in an already-constructed breaker (e.g. one obtained from a
    /// [`crate::circuit_breaker_registry::CircuitBreakerRegistry`]) instead
    /// of building a fresh one, so its state persists across callers that
    /// share the same breaker instance.
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerPolicy) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy<E>) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Result<Self, EnvelopeError> {
        self.timeout = Some(TimeoutPolicy::new(duration)?);
        Ok(self)
    }

    pub fn build(self) -> Result<ResilienceEnvelope<E>, EnvelopeError> {
        let sink = self.telemetry;

        let mut bulkhead = self.bulkhead.unwrap_or_else(|| BulkheadPolicy::new(100));
        let mut circuit_breaker = self
            .circuit_breaker
            .unwrap_or_else(|| CircuitBreakerPolicy::new(5, Duration::from_secs(30)));
        let mut retry = self.retry.unwrap_or_else(|| RetryPolicy::builder().build());
        let mut timeout = match self.timeout {
            Some(t) => t,
            None => TimeoutPolicy::new(Duration::from_secs(30))?,
        };

        if let Some(sink) = sink {
            bulkhead = bulkhead.with_telemetry(sink.clone());
            circuit_breaker = circuit_breaker.with_telemetry(sink.clone());
            retry = retry.with_telemetry(sink.clone());
            timeout = timeout.with_telemetry(sink);
        }

        Ok(ResilienceEnvelope {
            rate_limiter: self.rate_limiter,
            bulkhead,
            circuit_breaker,
            retry,
            timeout,
        })
    }
}

impl<E> Default for ResilienceEnvelopeBuilder<E>
where
    E: std::error::Error + Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[derive(Debug, Clone, thiserror::Error, PartialEq)]
    #[error("boom")]
    struct Boom;

    #[tokio::test]
    async fn happy_path_runs_operation_once() {
        let envelope: ResilienceEnvelope<Boom> =
            ResilienceEnvelope::builder().build().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let result = envelope
            .execute(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ResilienceError<Boom>>(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limiter_rejects_before_touching_bulkhead() {
        let limiter = RateLimiter::token_bucket("x", 0, StdDuration::from_secs(60));
        let envelope: ResilienceEnvelope<Boom> =
            ResilienceEnvelope::builder().rate_limiter(limiter).build().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let result = envelope
            .execute(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ResilienceError<Boom>>(())
                }
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retry_is_contained_within_one_circuit_breaker_accounting() {
        let envelope: ResilienceEnvelope<Boom> = ResilienceEnvelope::builder()
            .retry(RetryPolicy::builder().max_attempts(3).unwrap().build())
            .circuit_breaker(5, StdDuration::from_secs(30))
            .build()
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let result = envelope
            .execute(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ResilienceError::Inner(Boom))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
