#![forbid(unsafe_code)]

//! # enroute-core
//!
//! Parallel dispatch and degradation core for a location-aware content
//! enrichment system: as a tour moves between Waypoints, a pool of Workers
//! (one per content modality — video, music, narrated text, ...) race to
//! produce an [`Artifact`] for each stop, every call wrapped in its own
//! resilience envelope (rate limiter, bulkhead, circuit breaker, retry,
//! timeout), and a Smart Dispatch Queue resolves "enough" results under a
//! soft/hard deadline pair rather than waiting on every Worker to answer.
//! The [`selection::SelectionPolicy`] then turns the survivors into one
//! [`selection::Decision`] per Waypoint, respecting hard safety rules (no
//! video for drivers, excluded topics) ahead of any scoring.
//!
//! The resilience primitives themselves — [`RetryPolicy`], [`BulkheadPolicy`],
//! [`CircuitBreakerPolicy`], [`TimeoutPolicy`], and their [`ResilienceStack`]
//! composition — are general-purpose and usable standalone; [`envelope`]
//! builds on them for the per-Worker composition this crate actually uses.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use enroute_core::{
//!     CircuitBreakerRegistry, EventBus, HealthRegistry, Orchestrator, OrchestratorConfig,
//!     Profile, SelectionPolicy, Waypoint, WaypointId, WorkerRegistry,
//! };
//! use enroute_core::mock_worker::MockContentWorker;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(WorkerRegistry::new());
//! let worker = Arc::new(MockContentWorker::video("video"));
//! worker.start().await?;
//! registry.register(worker).await;
//!
//! let orchestrator = Orchestrator::new(
//!     registry,
//!     Arc::new(CircuitBreakerRegistry::new()),
//!     Arc::new(EventBus::new(64)),
//!     Arc::new(HealthRegistry::new()),
//!     SelectionPolicy::new(),
//!     OrchestratorConfig::default(),
//! );
//! orchestrator.start().await?;
//!
//! let waypoint = Waypoint::new(WaypointId::new("wp-1"), 0, "1 Main St", 0.0, 0.0);
//! let decisions = orchestrator.submit_batch(vec![waypoint], Arc::new(Profile::default())).await?;
//! assert_eq!(decisions.len(), 1);
//! orchestrator.stop().await?;
//! # Ok(())
//! # }
//! ```

mod artifact;
mod backoff;
mod bulkhead;
mod circuit_breaker;
pub mod circuit_breaker_registry;
mod clock;
pub mod config;
mod content_kind;
pub mod core_error;
pub mod dispatch_queue;
pub mod envelope;
mod error;
pub mod events;
pub mod health;
mod jitter;
pub mod mock_worker;
pub mod orchestrator;
pub mod profile;
mod rate_limiter;
mod retry;
pub mod selection;
mod sleeper;
mod stack;
pub mod telemetry;
mod timeout;
pub mod waypoint;
pub mod worker;
pub mod worker_registry;

// Re-exports
pub use artifact::{Artifact, ArtifactBuilder, ArtifactError, FailureRecord};
pub use backoff::Backoff;
pub use bulkhead::{BulkheadPolicy, BulkheadStats};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerPolicy, CircuitBreakerStats, CircuitState,
};
pub use circuit_breaker_registry::{CircuitBreakerHandle, CircuitBreakerRegistry};
pub use clock::{Clock, MonotonicClock};
pub use config::Settings;
pub use content_kind::ContentKind;
pub use core_error::CoreError;
pub use dispatch_queue::{DispatchMetrics, DispatchStatus, NoResults, SmartDispatchQueue};
pub use envelope::{EnvelopeError, ResilienceEnvelope, ResilienceEnvelopeBuilder};
pub use error::ResilienceError;
pub use events::{CoreEvent, EventBus, EventKind};
pub use health::HealthRegistry;
pub use jitter::Jitter;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorStats};
pub use profile::{AccessibilityNeed, AgeBracket, ContentPreferenceBias, Gender, Profile, TravelMode, TripPurpose};
pub use rate_limiter::{RateLimitExceeded, RateLimiter, RateLimiterStats};
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use selection::{Decision, SelectionError, SelectionPolicy};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stack::{ResilienceStack, ResilienceStackBuilder, StackError};
pub use timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT};
pub use waypoint::{Waypoint, WaypointId};
pub use worker::{Worker, WorkerContext, WorkerError, WorkerLifecycle, WorkerMetadata, WorkerState};
pub use worker_registry::{DiscoveryError, WorkerManifest, WorkerRegistry};

pub mod prelude;
