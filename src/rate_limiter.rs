//! Rate limiter resilience primitive (§4.1): token bucket and sliding window,
//! selectable by name, exposing a statistics snapshot.

use crate::telemetry::{PolicyEvent, RateLimiterEvent, TelemetrySink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Error raised when admission is denied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("rate limit exceeded{}", .retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
pub struct RateLimitExceeded {
    pub retry_after: Option<Duration>,
}

/// A statistics snapshot for introspection/observability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterStats {
    pub admitted: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    TokenBucket { rate_per_sec: f64, capacity: f64 },
    SlidingWindow { max_calls: u64, period: Duration },
}

struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
}

enum LimiterState {
    TokenBucket(Mutex<TokenBucketState>),
    SlidingWindow(Mutex<VecDeque<Instant>>),
}

/// A named rate limiter instance. Clone is cheap (shared state).
pub struct RateLimiter {
    name: String,
    strategy: Strategy,
    state: std::sync::Arc<LimiterState>,
    admitted: std::sync::Arc<AtomicU64>,
    rejected: std::sync::Arc<AtomicU64>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            strategy: self.strategy,
            state: self.state.clone(),
            admitted: self.admitted.clone(),
            rejected: self.rejected.clone(),
            telemetry: self.telemetry.clone(),
        }
    }
}

impl RateLimiter {
    /// Token bucket: refills continuously at `max_calls / period`, capacity
    /// defaults to `max_calls`.
    pub fn token_bucket(name: impl Into<String>, max_calls: u64, period: Duration) -> Self {
        let rate_per_sec = max_calls as f64 / period.as_secs_f64();
        Self {
            name: name.into(),
            strategy: Strategy::TokenBucket { rate_per_sec, capacity: max_calls as f64 },
            state: std::sync::Arc::new(LimiterState::TokenBucket(Mutex::new(TokenBucketState {
                tokens: max_calls as f64,
                last_refill: Instant::now(),
            }))),
            admitted: std::sync::Arc::new(AtomicU64::new(0)),
            rejected: std::sync::Arc::new(AtomicU64::new(0)),
            telemetry: None,
        }
    }

    /// Sliding window: admits a request iff fewer than `max_calls` requests
    /// occurred in the trailing `period`.
    pub fn sliding_window(name: impl Into<String>, max_calls: u64, period: Duration) -> Self {
        Self {
            name: name.into(),
            strategy: Strategy::SlidingWindow { max_calls, period },
            state: std::sync::Arc::new(LimiterState::SlidingWindow(Mutex::new(VecDeque::new()))),
            admitted: std::sync::Arc::new(AtomicU64::new(0)),
            rejected: std::sync::Arc::new(AtomicU64::new(0)),
            telemetry: None,
        }
    }

    /// Attach a sink observing every admission decision.
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    fn emit(&self, event: RateLimiterEvent) {
        if let Some(sink) = &self.telemetry {
            sink.emit(PolicyEvent::RateLimiter(event));
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Non-blocking admission check for `tokens` permits.
    pub fn try_acquire(&self, tokens: u32) -> Result<(), RateLimitExceeded> {
        match (&self.strategy, self.state.as_ref()) {
            (Strategy::TokenBucket { rate_per_sec, capacity }, LimiterState::TokenBucket(m)) => {
                let mut guard = m.lock().unwrap();
                let now = Instant::now();
                let elapsed = now.duration_since(guard.last_refill).as_secs_f64();
                guard.tokens = (guard.tokens + elapsed * rate_per_sec).min(*capacity);
                guard.last_refill = now;

                if guard.tokens >= tokens as f64 {
                    guard.tokens -= tokens as f64;
                    self.admitted.fetch_add(1, Ordering::Relaxed);
                    self.emit(RateLimiterEvent::Admitted);
                    Ok(())
                } else {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    let missing = tokens as f64 - guard.tokens;
                    let wait = Duration::from_secs_f64((missing / rate_per_sec).max(0.0));
                    self.emit(RateLimiterEvent::Rejected { retry_after: Some(wait) });
                    Err(RateLimitExceeded { retry_after: Some(wait) })
                }
            }
            (Strategy::SlidingWindow { max_calls, period }, LimiterState::SlidingWindow(m)) => {
                let mut window = m.lock().unwrap();
                let now = Instant::now();
                while let Some(front) = window.front() {
                    if now.duration_since(*front) >= *period {
                        window.pop_front();
                    } else {
                        break;
                    }
                }

                if (window.len() as u64) < *max_calls {
                    window.push_back(now);
                    self.admitted.fetch_add(1, Ordering::Relaxed);
                    self.emit(RateLimiterEvent::Admitted);
                    Ok(())
                } else {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    let retry_after = window.front().map(|oldest| {
                        let elapsed = now.duration_since(*oldest);
                        period.saturating_sub(elapsed)
                    });
                    self.emit(RateLimiterEvent::Rejected { retry_after });
                    Err(RateLimitExceeded { retry_after })
                }
            }
            _ => unreachable!("strategy/state pairing is fixed at construction"),
        }
    }

    /// Blocking admission: waits up to `timeout` for a permit to free up.
    pub async fn acquire(&self, tokens: u32, timeout: Duration) -> Result<(), RateLimitExceeded> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_acquire(tokens) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(e);
                    }
                    let sleep_for = e.retry_after.unwrap_or(Duration::from_millis(10)).min(remaining);
                    tokio::time::sleep(sleep_for).await;
                }
            }
        }
    }

    /// Seconds until the next admission would be possible, for the sliding
    /// window strategy's required introspection.
    pub fn seconds_until_next_admission(&self) -> f64 {
        match (&self.strategy, self.state.as_ref()) {
            (Strategy::SlidingWindow { max_calls, period }, LimiterState::SlidingWindow(m)) => {
                let window = m.lock().unwrap();
                if (window.len() as u64) < *max_calls {
                    0.0
                } else {
                    window
                        .front()
                        .map(|oldest| {
                            let elapsed = Instant::now().duration_since(*oldest);
                            period.saturating_sub(elapsed).as_secs_f64()
                        })
                        .unwrap_or(0.0)
                }
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_bucket_admits_up_to_capacity() {
        let limiter = RateLimiter::token_bucket("video", 3, Duration::from_secs(60));
        assert!(limiter.try_acquire(1).is_ok());
        assert!(limiter.try_acquire(1).is_ok());
        assert!(limiter.try_acquire(1).is_ok());
        assert!(limiter.try_acquire(1).is_err());
        assert_eq!(limiter.stats().admitted, 3);
        assert_eq!(limiter.stats().rejected, 1);
    }

    #[test]
    fn token_bucket_never_exceeds_capacity() {
        let limiter = RateLimiter::token_bucket("x", 5, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(50));
        // A long idle period must not let tokens exceed capacity.
        for _ in 0..5 {
            assert!(limiter.try_acquire(1).is_ok());
        }
        assert!(limiter.try_acquire(1).is_err());
    }

    #[test]
    fn sliding_window_admits_up_to_max_then_denies() {
        let limiter = RateLimiter::sliding_window("music", 2, Duration::from_secs(60));
        assert!(limiter.try_acquire(1).is_ok());
        assert!(limiter.try_acquire(1).is_ok());
        assert!(limiter.try_acquire(1).is_err());
    }

    #[test]
    fn seconds_until_next_admission_is_zero_when_not_full() {
        let limiter = RateLimiter::sliding_window("text", 2, Duration::from_secs(60));
        assert_eq!(limiter.seconds_until_next_admission(), 0.0);
    }
}
