//! The Event bus (§4, component 8): decoupled lifecycle notifications for
//! Worker, Dispatch, and Decision state transitions (§6 "Event stream").
//!
//! Delivery is serialised per subscriber in publish order; a handler that
//! fails must not prevent delivery to other subscribers and must not
//! propagate to the publisher (§5 "Shared-resource policy"). Implemented
//! with one broadcast channel per subscriber plus a best-effort fan-out, so
//! a lagging or dropped subscriber never blocks publication.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::broadcast;
use uuid::Uuid;

/// The domain-level events published by the core (§6).
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    WorkerLoaded { name: String, version: String },
    WorkerStarted { name: String },
    WorkerStopped { name: String, uptime_seconds: f64 },
    WorkerError { name: String, error_kind: String, error_message: String, stacktrace: Option<String> },
    DispatchStarted { waypoint_id: String, address: String },
    WorkerCompleted {
        name: String,
        waypoint_id: String,
        duration_seconds: f64,
        success: bool,
        content_kind: Option<String>,
    },
    DispatchCompleted {
        waypoint_id: String,
        selected_kind: Option<String>,
        candidates_count: usize,
        reasoning: String,
    },
}

impl EventKind {
    /// Stable type name, used for event-type-scoped ordering guarantees (§5:
    /// "cross-type ordering is not guaranteed").
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::WorkerLoaded { .. } => "WorkerLoaded",
            EventKind::WorkerStarted { .. } => "WorkerStarted",
            EventKind::WorkerStopped { .. } => "WorkerStopped",
            EventKind::WorkerError { .. } => "WorkerError",
            EventKind::DispatchStarted { .. } => "DispatchStarted",
            EventKind::WorkerCompleted { .. } => "WorkerCompleted",
            EventKind::DispatchCompleted { .. } => "DispatchCompleted",
        }
    }
}

/// An immutable, published event envelope (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct CoreEvent {
    pub event_id: String,
    pub event_type: &'static str,
    pub timestamp: SystemTime,
    pub source: String,
    pub correlation_id: Option<String>,
    pub metadata: std::collections::HashMap<String, String>,
    pub kind: EventKind,
}

impl CoreEvent {
    pub fn new(source: impl Into<String>, kind: EventKind) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: kind.type_name(),
            timestamp: SystemTime::now(),
            source: source.into(),
            correlation_id: None,
            metadata: std::collections::HashMap::new(),
            kind,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Per-subscriber delivery counters, for observability.
#[derive(Debug, Default)]
struct BusStats {
    published: AtomicU64,
    lagged: AtomicU64,
}

/// Process-wide event bus. Publish order is global per event type; delivery
/// to each subscriber is via its own broadcast receiver, so one slow or
/// panicking subscriber cannot block or break delivery to others (§5).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
    stats: Arc<BusStats>,
}

impl EventBus {
    /// `capacity` bounds the per-subscriber backlog; a subscriber that falls
    /// behind by more than `capacity` events misses the oldest ones and
    /// observes a `RecvError::Lagged` on its next `recv` (back-pressure is
    /// bounded-buffer, per §5 "result stream" policy applied symmetrically
    /// here).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, stats: Arc::new(BusStats::default()) }
    }

    /// Publish an event. Never blocks; if there are no subscribers the event
    /// is simply dropped.
    pub fn publish(&self, event: CoreEvent) {
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber { receiver: self.sender.subscribe(), stats: self.stats.clone() }
    }

    pub fn published_count(&self) -> u64 {
        self.stats.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A single subscriber's receiving end. Events arrive in global publish
/// order per event type; a subscriber that lags past the bus capacity skips
/// forward rather than blocking the publisher.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<CoreEvent>,
    stats: Arc<BusStats>,
}

impl EventSubscriber {
    /// Await the next event, transparently skipping past a lag gap (and
    /// recording it) rather than surfacing `RecvError::Lagged` to callers —
    /// handlers should not need to know about broadcast-channel internals.
    pub async fn recv(&mut self) -> Option<CoreEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    self.stats.lagged.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
