// ABOUTME: Deployment attempt record and its read-only status view.
// ABOUTME: Attempt status changes go through the deployment sub-machine table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::authz::Actor;
use crate::broadcast::ProgressEvent;
use crate::lifecycle::{DeploymentStatus, LifecycleError, deployment_transition_allowed};
use crate::store::SegmentKey;
use crate::tracker::{StepRecord, StepTracker};
use crate::types::{ArtifactId, AttemptId, SegmentName};

/// One run of the rollout pipeline for an (artifact, segment) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAttempt {
    pub id: AttemptId,
    pub artifact_id: ArtifactId,
    pub segment: SegmentName,
    pub status: DeploymentStatus,
    pub steps: StepTracker,
    /// Records produced by rollback, newest step first.
    pub compensations: Vec<StepRecord>,
    /// Values captured from step output, available to later steps.
    pub outputs: BTreeMap<String, String>,
    pub initiator: Actor,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl DeploymentAttempt {
    pub fn new<I, S>(artifact_id: ArtifactId, segment: SegmentName, initiator: Actor, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: AttemptId::generate(),
            artifact_id,
            segment,
            status: DeploymentStatus::Pending,
            steps: StepTracker::new(steps),
            compensations: Vec::new(),
            outputs: BTreeMap::new(),
            initiator,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            rolled_back_at: None,
            error: None,
        }
    }

    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.artifact_id.clone(), self.segment.clone())
    }

    /// Move to `to` if the sub-machine allows it, stamping the matching timestamp.
    pub fn transition(&mut self, to: DeploymentStatus) -> Result<(), LifecycleError> {
        if !deployment_transition_allowed(self.status, to) {
            return Err(LifecycleError::InvalidDeploymentTransition {
                from: self.status,
                to,
            });
        }

        let now = Utc::now();
        match to {
            DeploymentStatus::Running => self.started_at = Some(now),
            DeploymentStatus::Completed | DeploymentStatus::Failed => self.ended_at = Some(now),
            DeploymentStatus::RolledBack => self.rolled_back_at = Some(now),
            DeploymentStatus::Pending => {}
        }
        self.status = to;
        Ok(())
    }

    pub fn percent_complete(&self) -> u8 {
        self.steps.percent_complete()
    }

    pub fn view(&self) -> DeploymentStatusView {
        DeploymentStatusView {
            attempt_id: self.id.clone(),
            artifact_id: self.artifact_id.clone(),
            segment: self.segment.clone(),
            status: self.status,
            percent_complete: self.percent_complete(),
            current_step: self.steps.current_step().map(|s| s.name.clone()),
            steps: self.steps.steps().to_vec(),
            compensations: self.compensations.clone(),
            error: self.error.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    pub(crate) fn status_event(&self) -> ProgressEvent {
        ProgressEvent::AttemptStatusChanged {
            attempt_id: self.id.clone(),
            artifact_id: self.artifact_id.clone(),
            segment: self.segment.clone(),
            status: self.status,
            percent_complete: self.percent_complete(),
            error: self.error.clone(),
            at: Utc::now(),
        }
    }
}

/// What `get_deployment_status` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStatusView {
    pub attempt_id: AttemptId,
    pub artifact_id: ArtifactId,
    pub segment: SegmentName,
    pub status: DeploymentStatus,
    pub percent_complete: u8,
    pub current_step: Option<String>,
    pub steps: Vec<StepRecord>,
    pub compensations: Vec<StepRecord>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}
