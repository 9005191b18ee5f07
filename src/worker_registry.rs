//! Process-wide Worker registry (§4.2, §6): lookup by name, enumeration,
//! capability filtering, and manifest-driven dependency resolution.
//!
//! Guarded by a readers-writer lock per §5 ("reads dominate and must not
//! block one another").

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::worker::Worker;

/// One Worker's registration manifest (§6), discovered beneath a configured root.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config_schema: serde_json::Value,
    pub entry_point: String,
    #[serde(default)]
    pub replace: bool,
}

fn default_priority() -> u32 {
    100
}

fn default_enabled() -> bool {
    true
}

/// Errors discovering or resolving manifests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to read manifest directory {path}: {reason}")]
    DirectoryUnreadable { path: String, reason: String },
    #[error("failed to parse manifest {path}: {reason}")]
    ParseFailed { path: String, reason: String },
    #[error("manifest {name} has invalid version {version}")]
    InvalidVersion { name: String, version: String },
    #[error("duplicate worker name {0} without an explicit replace flag")]
    DuplicateName(String),
    #[error("worker {name} depends on unknown worker {dependency}")]
    MissingDependency { name: String, dependency: String },
    #[error("circular dependency detected among workers: {0:?}")]
    CircularDependency(Vec<String>),
}

/// Validate a semver-ish string: `MAJOR.MINOR.PATCH[-label]`.
fn is_valid_semver(version: &str) -> bool {
    let (core, _label) = version.split_once('-').unwrap_or((version, ""));
    let parts: Vec<&str> = core.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Read every `*.json` manifest beneath `root` (recursively) and validate
/// them as a set: semver, duplicate names, missing/circular dependencies.
/// Returns manifests in topologically-sorted (dependency-first) order.
pub fn discover_manifests(root: &Path) -> Result<Vec<WorkerManifest>, DiscoveryError> {
    let mut manifests = Vec::new();
    collect_manifest_files(root, &mut manifests)?;
    validate_and_sort(manifests)
}

fn collect_manifest_files(
    dir: &Path,
    out: &mut Vec<WorkerManifest>,
) -> Result<(), DiscoveryError> {
    let entries = fs::read_dir(dir).map_err(|e| DiscoveryError::DirectoryUnreadable {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| DiscoveryError::DirectoryUnreadable {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_manifest_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let text = fs::read_to_string(&path).map_err(|e| DiscoveryError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            let manifest: WorkerManifest =
                serde_json::from_str(&text).map_err(|e| DiscoveryError::ParseFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            out.push(manifest);
        }
    }
    Ok(())
}

fn validate_and_sort(manifests: Vec<WorkerManifest>) -> Result<Vec<WorkerManifest>, DiscoveryError> {
    let mut by_name: HashMap<String, WorkerManifest> = HashMap::new();
    for m in manifests {
        if !is_valid_semver(&m.version) {
            return Err(DiscoveryError::InvalidVersion { name: m.name, version: m.version });
        }
        if let Some(existing) = by_name.get(&m.name) {
            if !m.replace && !existing.replace {
                return Err(DiscoveryError::DuplicateName(m.name));
            }
        }
        by_name.insert(m.name.clone(), m);
    }

    let names: HashSet<String> = by_name.keys().cloned().collect();
    for m in by_name.values() {
        for dep in &m.depends_on {
            if !names.contains(dep) {
                return Err(DiscoveryError::MissingDependency {
                    name: m.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Kahn's algorithm: dependency-first topological order.
    let mut in_degree: HashMap<String, usize> =
        by_name.keys().map(|n| (n.clone(), 0)).collect();
    let mut dependents: HashMap<String, Vec<String>> =
        by_name.keys().map(|n| (n.clone(), Vec::new())).collect();

    for m in by_name.values() {
        for dep in &m.depends_on {
            *in_degree.get_mut(&m.name).unwrap() += 1;
            dependents.get_mut(dep).unwrap().push(m.name.clone());
        }
    }

    let mut queue: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(n, _)| n.clone())
        .collect();
    let mut sorted_names = Vec::new();
    while let Some(name) = queue.pop_front() {
        sorted_names.push(name.clone());
        for dependent in &dependents[&name] {
            let deg = in_degree.get_mut(dependent).unwrap();
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(dependent.clone());
            }
        }
    }

    if sorted_names.len() != by_name.len() {
        let cyclic: Vec<String> =
            by_name.keys().filter(|n| !sorted_names.contains(n)).cloned().collect();
        return Err(DiscoveryError::CircularDependency(cyclic));
    }

    Ok(sorted_names.into_iter().map(|n| by_name.remove(&n).unwrap()).collect())
}

/// Process-wide registry mapping Worker names to live instances.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, Arc<dyn Worker>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, worker: Arc<dyn Worker>) {
        let name = worker.metadata().name.clone();
        self.workers.write().await.insert(name, worker);
    }

    pub async fn lookup(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.read().await.get(name).cloned()
    }

    pub async fn enumerate(&self) -> Vec<Arc<dyn Worker>> {
        self.workers.read().await.values().cloned().collect()
    }

    pub async fn filter_by_capability(&self, tag: &str) -> Vec<Arc<dyn Worker>> {
        self.workers
            .read()
            .await
            .values()
            .filter(|w| w.metadata().capability_tags.contains(tag))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
