// ABOUTME: What callers get back when an attempt or a rollback ends.
// ABOUTME: Carries the terminal status together with the non-fatal warnings collected on the way.

use crate::diagnostics::Warning;
use crate::lifecycle::DeploymentStatus;
use crate::types::AttemptId;

/// Result of a finished attempt task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutcome {
    pub attempt_id: AttemptId,
    pub status: DeploymentStatus,
    /// Marker-release and promotion problems; the status stands regardless.
    pub warnings: Vec<Warning>,
}

/// Result of [`Orchestrator::rollback`](super::Orchestrator::rollback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    pub attempt_id: AttemptId,
    /// One per compensating action that failed. Empty on a repeated rollback.
    pub warnings: Vec<Warning>,
}

impl RollbackReport {
    pub(super) fn clean(attempt_id: AttemptId) -> Self {
        Self {
            attempt_id,
            warnings: Vec::new(),
        }
    }
}
