//! The Orchestrator (§4.4): bounded-parallelism Waypoint dispatch. Pulls
//! Workers from the registry, wraps each call in its own resilience envelope
//! (§4.1, with a breaker shared per Worker name via
//! [`CircuitBreakerRegistry`]), hands completions to a per-Waypoint
//! [`SmartDispatchQueue`] (§4.3), and resolves the survivors through the
//! [`SelectionPolicy`] (§4.5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch, Mutex as AsyncMutex, RwLock as AsyncRwLock, Semaphore};
use tokio::task::JoinHandle;

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::config::Settings;
use crate::core_error::CoreError;
use crate::dispatch_queue::{DispatchQueueConfig, SmartDispatchQueue};
use crate::envelope::ResilienceEnvelope;
use crate::error::ResilienceError;
use crate::events::{CoreEvent, EventBus, EventKind};
use crate::health::HealthRegistry;
use crate::profile::Profile;
use crate::retry::RetryPolicy;
use crate::Backoff;
use crate::selection::{Candidate, Decision, SelectionPolicy};
use crate::telemetry::TelemetrySink;
use crate::waypoint::{Waypoint, WaypointId};
use crate::worker::{Worker, WorkerContext, WorkerError, WorkerMetadata};
use crate::worker_registry::WorkerRegistry;

const EVENT_SOURCE: &str = "orchestrator";

/// The Orchestrator's error type is the crate-wide [`CoreError`]; this alias
/// exists so callers that only touch the Orchestrator seam don't need to
/// name `CoreError` directly.
pub type OrchestratorError = CoreError;

/// Construction-time Orchestrator configuration (§4.4, §4.7). Typically built
/// from a loaded [`Settings`] via [`OrchestratorConfig::from_settings`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bounded-parallelism pool size `P` (§4.4).
    pub parallelism: usize,
    /// Default expected Worker count `E` (§4.3) used when the registry is
    /// empty (otherwise `E` is the live registry enumeration count).
    pub expected_workers: usize,
    pub soft_deadline: Duration,
    pub hard_deadline: Duration,
    /// How long [`Orchestrator::stop`] waits for in-flight dispatches to
    /// drain naturally before force-cancelling them.
    pub stop_grace: Duration,
    /// Capacity of the completion-notification channel.
    pub result_buffer: usize,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            parallelism: settings.orchestrator_parallelism(),
            expected_workers: settings.max_agents_per_point as usize,
            soft_deadline: settings.soft_deadline(),
            hard_deadline: settings.hard_deadline(),
            stop_grace: Duration::from_secs(5),
            result_buffer: 256,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallelism: 3,
            expected_workers: 4,
            soft_deadline: Duration::from_secs(15),
            hard_deadline: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
            result_buffer: 256,
        }
    }
}

/// Point-in-time Orchestrator counters, exposed for the CLI's `status`
/// command and for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
}

struct DispatchJob {
    waypoint: Waypoint,
    profile: Arc<Profile>,
}

struct Shared {
    semaphore: Arc<Semaphore>,
    results: AsyncRwLock<HashMap<WaypointId, Result<Decision, CoreError>>>,
    completions: broadcast::Sender<WaypointId>,
    out_tx: mpsc::Sender<Decision>,
    out_rx: AsyncMutex<mpsc::Receiver<Decision>>,
    in_tx: AsyncMutex<Option<mpsc::UnboundedSender<DispatchJob>>>,
    in_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<DispatchJob>>>,
    loop_handle: AsyncMutex<Option<JoinHandle<()>>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    running: std::sync::atomic::AtomicBool,
    pending: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicUsize,
}

/// Bounded-parallelism Waypoint dispatcher (§4.4). Cheap to clone: every
/// field is `Arc`-shared, matching the resilience primitives' own cloning
/// convention.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<WorkerRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    events: Arc<EventBus>,
    health: Arc<HealthRegistry>,
    selection: SelectionPolicy,
    config: OrchestratorConfig,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    inner: Arc<Shared>,
}

async fn wait_for_cancel(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn build_envelope(
    meta: &WorkerMetadata,
    breakers: &CircuitBreakerRegistry,
    telemetry: Option<&Arc<dyn TelemetrySink>>,
) -> Result<ResilienceEnvelope<WorkerError>, CoreError> {
    let breaker = breakers
        .get(&meta.name)
        .unwrap_or_else(|| breakers.register_new(&meta.name, meta.circuit_failure_threshold, meta.circuit_reset));

    let retry = RetryPolicy::builder()
        .max_attempts(meta.max_retries.max(1))
        .unwrap_or_else(|_| RetryPolicy::builder())
        .backoff(Backoff::constant(Duration::from_millis(50)))
        .build();

    let mut builder = ResilienceEnvelope::builder()
        .with_circuit_breaker(breaker)
        .retry(retry)
        .timeout(meta.timeout)?;
    if let Some(sink) = telemetry {
        builder = builder.telemetry(sink.clone());
    }
    builder.build().map_err(CoreError::from)
}

fn spawn_worker_task(
    worker: Arc<dyn Worker>,
    waypoint: Arc<Waypoint>,
    profile: Arc<Profile>,
    envelope: ResilienceEnvelope<WorkerError>,
    queue: SmartDispatchQueue,
    events: Arc<EventBus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = worker.metadata().name.clone();
        let kind = worker.metadata().declared_kind.clone();
        let waypoint_id = waypoint.id().to_string();
        let started = Instant::now();

        let result = envelope
            .execute(|| {
                let worker = worker.clone();
                let waypoint = waypoint.clone();
                let profile = profile.clone();
                async move {
                    worker
                        .execute(WorkerContext { waypoint: waypoint.as_ref(), profile: profile.as_ref() })
                        .await
                        .map_err(ResilienceError::Inner)
                }
            })
            .await;

        let duration_seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(Some(artifact)) => {
                events.publish(CoreEvent::new(
                    EVENT_SOURCE,
                    EventKind::WorkerCompleted {
                        name: name.clone(),
                        waypoint_id,
                        duration_seconds,
                        success: true,
                        content_kind: Some(kind.to_string()),
                    },
                ));
                queue.submit_success(name, artifact);
            }
            Ok(None) => {
                events.publish(CoreEvent::new(
                    EVENT_SOURCE,
                    EventKind::WorkerCompleted {
                        name: name.clone(),
                        waypoint_id,
                        duration_seconds,
                        success: false,
                        content_kind: None,
                    },
                ));
                queue.submit_failure(name, "no_relevant_content");
            }
            Err(e) => {
                let core: CoreError = e.into();
                events.publish(CoreEvent::new(
                    EVENT_SOURCE,
                    EventKind::WorkerError {
                        name: name.clone(),
                        error_kind: core.kind_name().to_string(),
                        error_message: core.to_string(),
                        stacktrace: None,
                    },
                ));
                events.publish(CoreEvent::new(
                    EVENT_SOURCE,
                    EventKind::WorkerCompleted {
                        name: name.clone(),
                        waypoint_id,
                        duration_seconds,
                        success: false,
                        content_kind: None,
                    },
                ));
                queue.submit_failure(name, core.kind_name());
            }
        }
    })
}

impl Orchestrator {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        events: Arc<EventBus>,
        health: Arc<HealthRegistry>,
        selection: SelectionPolicy,
        config: OrchestratorConfig,
    ) -> Self {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(config.result_buffer.max(1));
        let (completions, _) = broadcast::channel(config.result_buffer.max(1));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let inner = Arc::new(Shared {
            semaphore: Arc::new(Semaphore::new(config.parallelism.max(1))),
            results: AsyncRwLock::new(HashMap::new()),
            completions,
            out_tx,
            out_rx: AsyncMutex::new(out_rx),
            in_tx: AsyncMutex::new(Some(in_tx)),
            in_rx: AsyncMutex::new(Some(in_rx)),
            loop_handle: AsyncMutex::new(None),
            cancel_tx,
            cancel_rx,
            running: std::sync::atomic::AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        });

        Self { registry, breakers, events, health, selection, config, telemetry: None, inner }
    }

    /// Attach a sink observing every resilience-primitive state transition
    /// across every Worker's envelope (§4.7 observability skeleton). Must be
    /// called before [`Orchestrator::start`] to affect already-dispatched
    /// Waypoints; safe to call any time otherwise since envelopes are built
    /// fresh per dispatch.
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Begin accepting dispatches. Idempotent: calling `start` on an already
    /// running Orchestrator is a no-op. An Orchestrator that has been
    /// `stop`ped cannot be restarted — build a fresh one instead.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(in_rx) = self.inner.in_rx.lock().await.take() else {
            return Ok(());
        };

        let loop_ctx = LoopCtx {
            registry: self.registry.clone(),
            breakers: self.breakers.clone(),
            events: self.events.clone(),
            health: self.health.clone(),
            selection: self.selection.clone(),
            config: self.config.clone(),
            telemetry: self.telemetry.clone(),
            inner: self.inner.clone(),
        };

        let handle = tokio::spawn(run_loop(loop_ctx, in_rx));
        *self.inner.loop_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop accepting new dispatches, then wait up to `stop_grace` for
    /// in-flight dispatches to finish naturally before force-cancelling the
    /// remainder. Idempotent.
    pub async fn stop(&self) -> Result<(), CoreError> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        *self.inner.in_tx.lock().await = None;

        if let Some(handle) = self.inner.loop_handle.lock().await.take() {
            let _ = handle.await;
        }

        let parallelism = self.config.parallelism.max(1) as u32;
        let drained = tokio::time::timeout(
            self.config.stop_grace,
            self.inner.semaphore.clone().acquire_many_owned(parallelism),
        )
        .await;

        if drained.is_err() {
            let _ = self.inner.cancel_tx.send(true);
            let _ = self.inner.semaphore.clone().acquire_many_owned(parallelism).await;
        }

        Ok(())
    }

    /// Enqueue one Waypoint for dispatch. Returns as soon as the job is
    /// queued; use [`Orchestrator::result_for`] or [`Orchestrator::next_result`]
    /// to observe completion.
    pub async fn submit(&self, waypoint: Waypoint, profile: Arc<Profile>) -> Result<(), CoreError> {
        let guard = self.inner.in_tx.lock().await;
        match guard.as_ref() {
            Some(tx) => {
                self.inner.pending.fetch_add(1, Ordering::SeqCst);
                tx.send(DispatchJob { waypoint, profile }).map_err(|_| CoreError::NotRunning)
            }
            None => Err(CoreError::NotRunning),
        }
    }

    /// Submit every Waypoint, then block until all have produced a Decision.
    /// Results are returned in the same order as `waypoints`, independent of
    /// completion order.
    pub async fn submit_batch(
        &self,
        waypoints: Vec<Waypoint>,
        profile: Arc<Profile>,
    ) -> Result<Vec<Decision>, CoreError> {
        let mut ids = Vec::with_capacity(waypoints.len());
        for waypoint in waypoints {
            ids.push(waypoint.id().clone());
            self.submit(waypoint, profile.clone()).await?;
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.await_result(&id).await?);
        }
        Ok(out)
    }

    /// Block until a Decision exists for `id`, for callers that already know
    /// which Waypoint they are waiting on (e.g. after [`Orchestrator::submit`]).
    async fn await_result(&self, id: &WaypointId) -> Result<Decision, CoreError> {
        loop {
            let mut completions = self.inner.completions.subscribe();
            if let Some(result) = self.inner.results.read().await.get(id).cloned() {
                return result;
            }
            loop {
                match completions.recv().await {
                    Ok(completed) if &completed == id => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return Err(CoreError::NotRunning),
                }
            }
        }
    }

    /// Non-blocking lookup of an already-produced Decision.
    pub async fn result_for(&self, id: &WaypointId) -> Option<Decision> {
        self.inner.results.read().await.get(id).cloned().and_then(|r| r.ok())
    }

    /// Await the next Decision in completion order (streaming mode, §4.4),
    /// or `None` if `timeout` elapses first.
    pub async fn next_result(&self, timeout: Duration) -> Option<Decision> {
        let mut guard = self.inner.out_rx.lock().await;
        match tokio::time::timeout(timeout, guard.recv()).await {
            Ok(Some(decision)) => Some(decision),
            _ => None,
        }
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            pending: self.inner.pending.load(Ordering::Relaxed),
            active: self.inner.active.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
        }
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[derive(Clone)]
struct LoopCtx {
    registry: Arc<WorkerRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    events: Arc<EventBus>,
    health: Arc<HealthRegistry>,
    selection: SelectionPolicy,
    config: OrchestratorConfig,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    inner: Arc<Shared>,
}

async fn run_loop(ctx: LoopCtx, mut in_rx: mpsc::UnboundedReceiver<DispatchJob>) {
    loop {
        let job = tokio::select! {
            biased;
            _ = wait_for_cancel(ctx.inner.cancel_rx.clone()) => break,
            maybe = in_rx.recv() => maybe,
        };

        let Some(job) = job else { break };
        ctx.inner.pending.fetch_sub(1, Ordering::SeqCst);

        let permit = match ctx.inner.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        ctx.inner.active.fetch_add(1, Ordering::SeqCst);

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let waypoint_id = job.waypoint.id().clone();
            let decision = dispatch_one(&ctx, job.waypoint, job.profile).await;

            ctx.inner.active.fetch_sub(1, Ordering::SeqCst);
            ctx.inner.completed.fetch_add(1, Ordering::SeqCst);

            if let Ok(decision) = &decision {
                let _ = ctx.inner.out_tx.try_send(decision.clone());
            }
            ctx.inner.results.write().await.insert(waypoint_id.clone(), decision);
            let _ = ctx.inner.completions.send(waypoint_id);
        });
    }
}

async fn dispatch_one(
    ctx: &LoopCtx,
    waypoint: Waypoint,
    profile: Arc<Profile>,
) -> Result<Decision, CoreError> {
    ctx.events.publish(CoreEvent::new(
        EVENT_SOURCE,
        EventKind::DispatchStarted { waypoint_id: waypoint.id().to_string(), address: waypoint.address().to_string() },
    ));

    let workers = ctx.registry.enumerate().await;
    let expected = if workers.is_empty() { ctx.config.expected_workers.max(1) } else { workers.len() };

    let queue_config = DispatchQueueConfig::new(expected, ctx.config.soft_deadline, ctx.config.hard_deadline);
    let queue = SmartDispatchQueue::new(queue_config).map_err(|e| CoreError::Config(e.to_string()))?;

    let waypoint = Arc::new(waypoint);
    let mut handles = Vec::with_capacity(workers.len());
    for worker in &workers {
        let meta = worker.metadata().clone();
        ctx.health.report(meta.name.clone(), worker.health());

        let envelope = match build_envelope(&meta, &ctx.breakers, ctx.telemetry.as_ref()) {
            Ok(envelope) => envelope,
            Err(_) => continue,
        };

        handles.push(spawn_worker_task(
            worker.clone(),
            waypoint.clone(),
            profile.clone(),
            envelope,
            queue.clone(),
            ctx.events.clone(),
        ));
    }

    let outcome = tokio::select! {
        result = queue.wait_for_results() => Some(result),
        _ = wait_for_cancel(ctx.inner.cancel_rx.clone()) => None,
    };

    for handle in &handles {
        handle.abort();
    }

    let waypoint_id = waypoint.id().clone();
    let decision = match outcome {
        None => Err(CoreError::Cancelled),
        Some(Err(no_results)) => Err(CoreError::from(no_results)),
        Some(Ok((artifacts, _metrics))) => {
            let candidates: Vec<Candidate> = artifacts
                .into_iter()
                .map(|(worker_name, artifact)| {
                    let priority =
                        workers.iter().find(|w| w.metadata().name == worker_name).map(|w| w.metadata().priority).unwrap_or(100);
                    Candidate::new(artifact, priority)
                })
                .collect();
            ctx.selection.decide(&waypoint, candidates, &profile).await.map_err(CoreError::from)
        }
    };

    if let Ok(decision) = &decision {
        ctx.events.publish(CoreEvent::new(
            EVENT_SOURCE,
            EventKind::DispatchCompleted {
                waypoint_id: waypoint_id.to_string(),
                selected_kind: decision.selected.as_ref().map(|a| a.kind().to_string()),
                candidates_count: decision.candidates.len(),
                reasoning: decision.reasoning.clone(),
            },
        ));
    }

    decision
}
