// ABOUTME: Progress events and the topics they are published on.
// ABOUTME: Events serialize to tagged JSON for notification transports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::lifecycle::{ArtifactStatus, DeploymentStatus, TriggerKind};
use crate::tracker::StepRecord;
use crate::types::{ArtifactId, AttemptId, SegmentName};

/// A channel observers can watch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Deployment(AttemptId),
    Artifact(ArtifactId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Deployment(id) => write!(f, "deployment_{id}"),
            Topic::Artifact(id) => write!(f, "chaincode_{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    ArtifactStatusChanged {
        artifact_id: ArtifactId,
        label: String,
        from: ArtifactStatus,
        to: ArtifactStatus,
        trigger: TriggerKind,
        actor: String,
        at: DateTime<Utc>,
    },
    AttemptStatusChanged {
        attempt_id: AttemptId,
        artifact_id: ArtifactId,
        segment: SegmentName,
        status: DeploymentStatus,
        percent_complete: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        at: DateTime<Utc>,
    },
    StepChanged {
        attempt_id: AttemptId,
        step: StepRecord,
        percent_complete: u8,
    },
    CompensationRecorded {
        attempt_id: AttemptId,
        step: StepRecord,
    },
}

impl ProgressEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::ArtifactStatusChanged { .. } => "artifact_status_changed",
            ProgressEvent::AttemptStatusChanged { .. } => "attempt_status_changed",
            ProgressEvent::StepChanged { .. } => "step_changed",
            ProgressEvent::CompensationRecorded { .. } => "compensation_recorded",
        }
    }

    /// Attempt status carried by this event, if it is an attempt status change.
    pub fn attempt_status(&self) -> Option<DeploymentStatus> {
        match self {
            ProgressEvent::AttemptStatusChanged { status, .. } => Some(*status),
            _ => None,
        }
    }
}
