// ABOUTME: In-process LifecycleStore backed by hash maps behind one mutex.
// ABOUTME: Used by the CLI and the tests; conditional writes are checked under the lock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::lifecycle::{Artifact, ArtifactStatus};
use crate::orchestrator::{DeploymentAttempt, RunningMarker};
use crate::tracker::StepRecord;
use crate::types::{ArtifactId, AttemptId};

use super::{ClaimOutcome, LifecycleStore, SegmentKey, StoreError, WriteResult};

#[derive(Default)]
struct Tables {
    artifacts: HashMap<ArtifactId, Artifact>,
    attempts: HashMap<AttemptId, DeploymentAttempt>,
    running: HashMap<SegmentKey, RunningMarker>,
}

/// Thread-safe in-memory store. Not durable.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts ever recorded, across all artifacts.
    pub fn attempt_count(&self) -> usize {
        self.tables.lock().attempts.len()
    }
}

#[async_trait]
impl LifecycleStore for InMemoryStore {
    async fn insert_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();

        if tables.artifacts.contains_key(&artifact.id) {
            return Err(StoreError::Conflict(format!("artifact {}", artifact.id)));
        }
        if tables
            .artifacts
            .values()
            .any(|a| a.name == artifact.name && a.version == artifact.version)
        {
            return Err(StoreError::Conflict(format!("artifact {}", artifact.label())));
        }

        tables.artifacts.insert(artifact.id.clone(), artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StoreError> {
        Ok(self.tables.lock().artifacts.get(id).cloned())
    }

    async fn list_artifacts_by_name(&self, name: &str) -> Result<Vec<Artifact>, StoreError> {
        let tables = self.tables.lock();
        let mut found: Vec<Artifact> = tables
            .artifacts
            .values()
            .filter(|a| a.name.as_str() == name)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }

    async fn cas_update_artifact(
        &self,
        expected: ArtifactStatus,
        artifact: &Artifact,
    ) -> Result<WriteResult, StoreError> {
        let mut tables = self.tables.lock();

        match tables.artifacts.get_mut(&artifact.id) {
            Some(stored) if stored.status == expected => {
                *stored = artifact.clone();
                Ok(WriteResult::Success)
            }
            Some(stored) => Ok(WriteResult::PreconditionFailed {
                current: Some(stored.status),
            }),
            None => Ok(WriteResult::PreconditionFailed { current: None }),
        }
    }

    async fn put_attempt(&self, attempt: &DeploymentAttempt) -> Result<(), StoreError> {
        self.tables
            .lock()
            .attempts
            .insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn get_attempt(&self, id: &AttemptId) -> Result<Option<DeploymentAttempt>, StoreError> {
        Ok(self.tables.lock().attempts.get(id).cloned())
    }

    async fn append_step(&self, attempt_id: &AttemptId, step: &StepRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let attempt = tables
            .attempts
            .get_mut(attempt_id)
            .ok_or_else(|| StoreError::Missing(format!("deployment attempt {attempt_id}")))?;
        attempt.steps.upsert(step.clone());
        Ok(())
    }

    async fn claim_running(
        &self,
        key: &SegmentKey,
        marker: &RunningMarker,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut tables = self.tables.lock();

        if let Some(existing) = tables.running.get(key) {
            return Ok(ClaimOutcome::Held(existing.clone()));
        }
        tables.running.insert(key.clone(), marker.clone());
        Ok(ClaimOutcome::Claimed)
    }

    async fn release_running(&self, key: &SegmentKey, attempt_id: &AttemptId) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();

        match tables.running.get(key) {
            Some(marker) if &marker.attempt_id == attempt_id => {
                tables.running.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn running_attempt(&self, key: &SegmentKey) -> Result<Option<RunningMarker>, StoreError> {
        Ok(self.tables.lock().running.get(key).cloned())
    }
}
