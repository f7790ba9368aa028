// ABOUTME: Error types for lifecycle transitions.
// ABOUTME: Covers authorization, unknown artifacts, illegal transitions and lost CAS races.

use crate::authz::Role;
use crate::error::ErrorKind;
use crate::store::StoreError;
use crate::types::ArtifactId;

use super::status::{ArtifactStatus, DeploymentStatus, TriggerKind};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The actor's role may not fire this trigger.
    #[error("role {role} is not allowed to {trigger}")]
    Unauthorized { role: Role, trigger: TriggerKind },

    #[error("artifact not found: {0}")]
    NotFound(ArtifactId),

    /// `(status, trigger)` is not in the transition table.
    #[error("cannot {trigger} an artifact that is {from}")]
    InvalidTransition {
        from: ArtifactStatus,
        trigger: TriggerKind,
    },

    #[error("deployment cannot move from {from} to {to}")]
    InvalidDeploymentTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    /// Someone else moved the artifact between our read and our write.
    #[error("artifact {artifact} changed concurrently (expected {expected}, found {found})")]
    ConcurrentModification {
        artifact: ArtifactId,
        expected: ArtifactStatus,
        found: String,
    },

    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LifecycleError::NotFound(_) => ErrorKind::NotFound,
            LifecycleError::InvalidTransition { .. }
            | LifecycleError::InvalidDeploymentTransition { .. } => ErrorKind::InvalidTransition,
            LifecycleError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            LifecycleError::InvalidSubmission(_) => ErrorKind::Validation,
            LifecycleError::Store(e) => e.kind(),
        }
    }
}
