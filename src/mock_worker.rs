//! A deterministic stand-in Worker used by tests, the registry doctest, and
//! the CLI's `--demo` mode — the mock-mode degradation path for a Worker
//! that would otherwise call out to an external API.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::artifact::Artifact;
use crate::content_kind::ContentKind;
use crate::waypoint::WaypointId;
use crate::worker::{Worker, WorkerContext, WorkerError, WorkerLifecycle, WorkerMetadata};

/// Produces one fixed [`Artifact`] per call, or fails, or returns nothing —
/// whichever the constructor or [`MockContentWorker::failing`] /
/// [`MockContentWorker::empty`] asked for.
pub struct MockContentWorker {
    metadata: WorkerMetadata,
    lifecycle: Mutex<WorkerLifecycle>,
    mode: Mode,
}

enum Mode {
    Produces { title: String, source: String, relevance_score: f64 },
    Empty,
    Fails(String),
}

impl MockContentWorker {
    fn new(name: impl Into<String>, kind: ContentKind, mode: Mode) -> Self {
        let name = name.into();
        Self {
            lifecycle: Mutex::new(WorkerLifecycle::new(name.clone())),
            metadata: WorkerMetadata::new(name, "0.1.0-mock", kind),
            mode,
        }
    }

    pub fn video(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ContentKind::Video,
            Mode::Produces {
                title: "Mock video clip".to_string(),
                source: "mock".to_string(),
                relevance_score: 7.0,
            },
        )
    }

    pub fn music(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ContentKind::Music,
            Mode::Produces {
                title: "Mock music track".to_string(),
                source: "mock".to_string(),
                relevance_score: 6.0,
            },
        )
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ContentKind::Text,
            Mode::Produces {
                title: "Mock trivia snippet".to_string(),
                source: "mock".to_string(),
                relevance_score: 5.0,
            },
        )
    }

    /// A Worker that always returns `Ok(None)` — "nothing relevant found".
    pub fn empty(name: impl Into<String>, kind: ContentKind) -> Self {
        Self::new(name, kind, Mode::Empty)
    }

    /// A Worker that always fails `execute`, for exercising the resilience
    /// envelope and the Smart Dispatch Queue's failure-handling paths.
    pub fn failing(name: impl Into<String>, kind: ContentKind, reason: impl Into<String>) -> Self {
        Self::new(name, kind, Mode::Fails(reason.into()))
    }

    async fn run_lifecycle_to_started(&self) -> Result<(), WorkerError> {
        let mut lc = self.lifecycle.lock().unwrap();
        lc.load()?;
        lc.configure()?;
        lc.start()
    }
}

#[async_trait]
impl Worker for MockContentWorker {
    fn metadata(&self) -> &WorkerMetadata {
        &self.metadata
    }

    async fn configure(&self, _config: &serde_json::Value) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), WorkerError> {
        self.run_lifecycle_to_started().await
    }

    async fn stop(&self) -> Result<(), WorkerError> {
        self.lifecycle.lock().unwrap().stop()
    }

    async fn destroy(&self) -> Result<(), WorkerError> {
        self.lifecycle.lock().unwrap().destroy()
    }

    fn health(&self) -> bool {
        self.lifecycle.lock().unwrap().state() == crate::worker::WorkerState::Started
    }

    async fn execute(&self, ctx: WorkerContext<'_>) -> Result<Option<Artifact>, WorkerError> {
        match &self.mode {
            Mode::Produces { title, source, relevance_score } => {
                let waypoint_id = WaypointId::new(ctx.waypoint.id().0.clone());
                let artifact = Artifact::builder(
                    waypoint_id,
                    self.metadata.declared_kind.clone(),
                    title.clone(),
                    source.clone(),
                )
                .relevance_score(*relevance_score)
                .mock()
                .build()
                .map_err(|e| WorkerError::ExecutionFailed(e.to_string()))?;
                Ok(Some(artifact))
            }
            Mode::Empty => Ok(None),
            Mode::Fails(reason) => Err(WorkerError::ExecutionFailed(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;
    use crate::waypoint::Waypoint;

    fn ctx<'a>(waypoint: &'a Waypoint, profile: &'a Profile) -> WorkerContext<'a> {
        WorkerContext { waypoint, profile }
    }

    #[tokio::test]
    async fn produces_worker_yields_mock_artifact() {
        let worker = MockContentWorker::video("video");
        worker.start().await.unwrap();
        let wp = Waypoint::new(WaypointId::new("wp-1"), 0, "Main St", 0.0, 0.0);
        let profile = Profile::default();
        let artifact = worker.execute(ctx(&wp, &profile)).await.unwrap();
        assert!(artifact.unwrap().is_mock());
    }

    #[tokio::test]
    async fn empty_worker_returns_none() {
        let worker = MockContentWorker::empty("silent", ContentKind::Text);
        worker.start().await.unwrap();
        let wp = Waypoint::new(WaypointId::new("wp-1"), 0, "Main St", 0.0, 0.0);
        let profile = Profile::default();
        assert!(worker.execute(ctx(&wp, &profile)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_worker_returns_execution_failed() {
        let worker = MockContentWorker::failing("broken", ContentKind::Music, "upstream down");
        worker.start().await.unwrap();
        let wp = Waypoint::new(WaypointId::new("wp-1"), 0, "Main St", 0.0, 0.0);
        let profile = Profile::default();
        let err = worker.execute(ctx(&wp, &profile)).await.unwrap_err();
        assert!(matches!(err, WorkerError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn health_reflects_lifecycle_state() {
        let worker = MockContentWorker::text("t");
        assert!(!worker.health());
        worker.start().await.unwrap();
        assert!(worker.health());
        worker.stop().await.unwrap();
        assert!(!worker.health());
    }
}
