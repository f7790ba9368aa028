// ABOUTME: Persistent store contract for artifacts, deployment attempts and running markers.
// ABOUTME: Every write is atomic; status updates and marker claims are conditional.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use std::fmt;

use crate::error::ErrorKind;
use crate::lifecycle::{Artifact, ArtifactStatus};
use crate::orchestrator::{DeploymentAttempt, RunningMarker};
use crate::tracker::StepRecord;
use crate::types::{ArtifactId, AttemptId, SegmentName};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} not found")]
    Missing(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Missing(_) => ErrorKind::NotFound,
            StoreError::Backend(_) => ErrorKind::Storage,
        }
    }
}

/// The pair a running marker guards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub artifact_id: ArtifactId,
    pub segment: SegmentName,
}

impl SegmentKey {
    pub fn new(artifact_id: ArtifactId, segment: SegmentName) -> Self {
        Self {
            artifact_id,
            segment,
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.artifact_id, self.segment)
    }
}

/// Outcome of a compare-and-swap on an artifact's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    Success,
    /// The stored status no longer matched; `current` is what was found
    /// (`None` if the artifact vanished).
    PreconditionFailed { current: Option<ArtifactStatus> },
}

/// Outcome of trying to claim a running marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    Held(RunningMarker),
}

#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// Insert a new artifact. Fails with `Conflict` if the id or the
    /// (name, version) pair is already taken.
    async fn insert_artifact(&self, artifact: &Artifact) -> Result<(), StoreError>;

    async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StoreError>;

    async fn list_artifacts_by_name(&self, name: &str) -> Result<Vec<Artifact>, StoreError>;

    /// Replace the artifact only if its stored status is still `expected`.
    async fn cas_update_artifact(
        &self,
        expected: ArtifactStatus,
        artifact: &Artifact,
    ) -> Result<WriteResult, StoreError>;

    async fn put_attempt(&self, attempt: &DeploymentAttempt) -> Result<(), StoreError>;

    async fn get_attempt(&self, id: &AttemptId) -> Result<Option<DeploymentAttempt>, StoreError>;

    /// Upsert one step record (matched by order index) on a stored attempt.
    async fn append_step(&self, attempt_id: &AttemptId, step: &StepRecord) -> Result<(), StoreError>;

    /// Set the running marker for `key` if none is present.
    async fn claim_running(
        &self,
        key: &SegmentKey,
        marker: &RunningMarker,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Remove the marker for `key` if it still names `attempt_id`.
    /// Returns whether a marker was removed.
    async fn release_running(&self, key: &SegmentKey, attempt_id: &AttemptId) -> Result<bool, StoreError>;

    async fn running_attempt(&self, key: &SegmentKey) -> Result<Option<RunningMarker>, StoreError>;
}
