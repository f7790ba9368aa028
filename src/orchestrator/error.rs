// ABOUTME: Error types for orchestrator operations.
// ABOUTME: Wraps lifecycle and store errors and adds deployment-specific failures.

use crate::error::ErrorKind;
use crate::lifecycle::{ArtifactStatus, DeploymentStatus, LifecycleError};
use crate::store::{SegmentKey, StoreError};
use crate::tracker::TrackerError;
use crate::types::{ArtifactId, AttemptId};

use super::RunningMarker;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("deployment attempt not found: {0}")]
    AttemptNotFound(AttemptId),

    /// Only Approved artifacts can be deployed.
    #[error("artifact {artifact} is {status}; only approved artifacts can be deployed")]
    NotApproved {
        artifact: ArtifactId,
        status: ArtifactStatus,
    },

    /// Another attempt holds the running marker for the pair.
    #[error("attempt {} is already running for {key} (on {}, pid {})", holder.attempt_id, holder.holder, holder.pid)]
    AlreadyRunning { key: SegmentKey, holder: RunningMarker },

    #[error("attempt {attempt} is {status}; only failed attempts can be rolled back")]
    NotRollbackable {
        attempt: AttemptId,
        status: DeploymentStatus,
    },

    /// The attempt ended but its terminal status could not be written. The
    /// running marker stays held and nothing was broadcast.
    #[error("attempt {attempt} ended {status} but the outcome was not persisted: {source}")]
    OutcomeNotPersisted {
        attempt: AttemptId,
        status: DeploymentStatus,
        #[source]
        source: StoreError,
    },

    /// The background task running an attempt panicked or was cancelled.
    #[error("deployment task for {attempt} did not finish: {reason}")]
    TaskAborted { attempt: AttemptId, reason: String },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Lifecycle(e) => e.kind(),
            OrchestratorError::Store(e) => e.kind(),
            OrchestratorError::Tracker(_) => ErrorKind::InvalidTransition,
            OrchestratorError::AttemptNotFound(_) => ErrorKind::NotFound,
            OrchestratorError::NotApproved { .. } | OrchestratorError::NotRollbackable { .. } => {
                ErrorKind::InvalidTransition
            }
            OrchestratorError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            OrchestratorError::OutcomeNotPersisted { .. } => ErrorKind::Storage,
            OrchestratorError::TaskAborted { .. } => ErrorKind::Permanent,
        }
    }

    /// Attempt currently holding the pair, for `AlreadyRunning`.
    pub fn holder(&self) -> Option<&AttemptId> {
        match self {
            OrchestratorError::AlreadyRunning { holder, .. } => Some(&holder.attempt_id),
            _ => None,
        }
    }
}
