//! The Artifact: one Worker's output for one Waypoint.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::content_kind::ContentKind;
use crate::waypoint::WaypointId;

/// An [`Artifact`] was constructed with an out-of-range relevance score.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("relevance_score {0} out of range [0.0, 10.0]")]
pub struct RelevanceScoreOutOfRange(pub f64);

/// An [`Artifact`] was constructed with an empty title.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("artifact title must be non-empty")]
pub struct EmptyTitle;

/// One Worker's output for one Waypoint. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    waypoint_id: WaypointId,
    kind: ContentKind,
    title: String,
    description: Option<String>,
    url: Option<String>,
    source: String,
    relevance_score: f64,
    duration_seconds: Option<u64>,
    metadata: HashMap<String, String>,
    created_at: SystemTime,
}

/// Builder for [`Artifact`], validating the invariants at construction time.
pub struct ArtifactBuilder {
    waypoint_id: WaypointId,
    kind: ContentKind,
    title: String,
    description: Option<String>,
    url: Option<String>,
    source: String,
    relevance_score: f64,
    duration_seconds: Option<u64>,
    metadata: HashMap<String, String>,
    created_at: Option<SystemTime>,
}

impl Artifact {
    pub fn builder(
        waypoint_id: WaypointId,
        kind: ContentKind,
        title: impl Into<String>,
        source: impl Into<String>,
    ) -> ArtifactBuilder {
        ArtifactBuilder {
            waypoint_id,
            kind,
            title: title.into(),
            description: None,
            url: None,
            source: source.into(),
            relevance_score: 5.0,
            duration_seconds: None,
            metadata: HashMap::new(),
            created_at: None,
        }
    }

    pub fn waypoint_id(&self) -> &WaypointId {
        &self.waypoint_id
    }

    pub fn kind(&self) -> &ContentKind {
        &self.kind
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn relevance_score(&self) -> f64 {
        self.relevance_score
    }

    pub fn duration_seconds(&self) -> Option<u64> {
        self.duration_seconds
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn is_mock(&self) -> bool {
        self.metadata.get("mock").map(|v| v == "true").unwrap_or(false)
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

impl ArtifactBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn relevance_score(mut self, score: f64) -> Self {
        self.relevance_score = score;
        self
    }

    pub fn duration_seconds(mut self, seconds: u64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn mock(mut self) -> Self {
        self.metadata.insert("mock".to_string(), "true".to_string());
        self
    }

    pub fn created_at(mut self, at: SystemTime) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn build(self) -> Result<Artifact, ArtifactError> {
        if self.title.trim().is_empty() {
            return Err(ArtifactError::EmptyTitle(EmptyTitle));
        }
        if !(0.0..=10.0).contains(&self.relevance_score) {
            return Err(ArtifactError::ScoreOutOfRange(RelevanceScoreOutOfRange(
                self.relevance_score,
            )));
        }
        Ok(Artifact {
            waypoint_id: self.waypoint_id,
            kind: self.kind,
            title: self.title,
            description: self.description,
            url: self.url,
            source: self.source,
            relevance_score: self.relevance_score,
            duration_seconds: self.duration_seconds,
            metadata: self.metadata,
            created_at: self.created_at.unwrap_or_else(SystemTime::now),
        })
    }
}

/// Errors constructing an [`Artifact`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArtifactError {
    #[error(transparent)]
    EmptyTitle(#[from] EmptyTitle),
    #[error(transparent)]
    ScoreOutOfRange(#[from] RelevanceScoreOutOfRange),
}

/// Worker identity + short error description + timestamp, maintained alongside
/// the candidate set for a Waypoint.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub worker_name: String,
    pub error: String,
    pub at: SystemTime,
}

impl FailureRecord {
    pub fn new(worker_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self { worker_name: worker_name.into(), error: error.into(), at: SystemTime::now() }
    }
}
