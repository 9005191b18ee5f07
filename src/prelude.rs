//! Convenient re-exports for the most commonly used enroute-core types.

pub use crate::{
    artifact::{Artifact, ArtifactBuilder, ArtifactError, FailureRecord},
    backoff::Backoff,
    bulkhead::{BulkheadPolicy, BulkheadStats},
    circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState},
    circuit_breaker_registry::{CircuitBreakerHandle, CircuitBreakerRegistry},
    config::Settings,
    content_kind::ContentKind,
    dispatch_queue::{DispatchMetrics, DispatchStatus, SmartDispatchQueue},
    envelope::{EnvelopeError, ResilienceEnvelope, ResilienceEnvelopeBuilder},
    error::ResilienceError,
    events::{CoreEvent, EventBus, EventKind},
    health::HealthRegistry,
    jitter::Jitter,
    orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorStats},
    profile::{AccessibilityNeed, AgeBracket, ContentPreferenceBias, Gender, Profile, TravelMode, TripPurpose},
    rate_limiter::{RateLimitExceeded, RateLimiter, RateLimiterStats},
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
    selection::{Decision, SelectionError, SelectionPolicy},
    telemetry::{InMemorySink, LoggingSink, NullSink, PolicyEvent, TelemetrySink},
    timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT},
    waypoint::{Waypoint, WaypointId},
    worker::{Worker, WorkerContext, WorkerError, WorkerLifecycle, WorkerMetadata, WorkerState},
    worker_registry::{DiscoveryError, WorkerManifest, WorkerRegistry},
    CoreError,
};
