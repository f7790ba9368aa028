// ABOUTME: Legal transition tables for artifact status and deployment status.
// ABOUTME: Pure functions; the machine and the orchestrator consult them before any write.

use super::status::{ArtifactStatus, DeploymentStatus, TriggerKind};

// =============================================================================
// Artifact table
// =============================================================================

/// Status an artifact moves to when `trigger` fires in `current`.
///
/// `None` means the pair is not in the table. `validate-fail` is a self-loop
/// on Uploaded.
pub fn next_status(current: ArtifactStatus, trigger: TriggerKind) -> Option<ArtifactStatus> {
    use ArtifactStatus::*;

    match trigger {
        TriggerKind::Submit => None,
        TriggerKind::ValidatePass => (current == Uploaded).then_some(Validated),
        TriggerKind::ValidateFail => (current == Uploaded).then_some(Uploaded),
        TriggerKind::Approve => (current == Validated).then_some(Approved),
        TriggerKind::Reject => (current == Validated).then_some(Rejected),
        TriggerKind::Deploy => (current == Approved).then_some(Deployed),
        TriggerKind::Activate => (current == Deployed).then_some(Active),
        TriggerKind::Deprecate => (current == Active).then_some(Deprecated),
    }
}

/// The status a trigger leads to, independent of where it starts.
///
/// Used for the idempotence check: an artifact already sitting in this status
/// gets its current record back instead of an error. The validate-fail
/// self-loop has no target here since repeating it records new errors.
pub fn target_status(trigger: TriggerKind) -> Option<ArtifactStatus> {
    match trigger {
        TriggerKind::Submit | TriggerKind::ValidateFail => None,
        TriggerKind::ValidatePass => Some(ArtifactStatus::Validated),
        TriggerKind::Approve => Some(ArtifactStatus::Approved),
        TriggerKind::Reject => Some(ArtifactStatus::Rejected),
        TriggerKind::Deploy => Some(ArtifactStatus::Deployed),
        TriggerKind::Activate => Some(ArtifactStatus::Active),
        TriggerKind::Deprecate => Some(ArtifactStatus::Deprecated),
    }
}

/// Triggers accepted from `status`, in table order.
pub fn allowed_triggers(status: ArtifactStatus) -> Vec<TriggerKind> {
    TriggerKind::ALL
        .into_iter()
        .filter(|trigger| next_status(status, *trigger).is_some())
        .collect()
}

// =============================================================================
// Deployment sub-machine
// =============================================================================

/// Whether an attempt may move from `from` to `to`.
pub fn deployment_transition_allowed(from: DeploymentStatus, to: DeploymentStatus) -> bool {
    use DeploymentStatus::*;

    matches!(
        (from, to),
        (Pending, Running) | (Running, Completed) | (Running, Failed) | (Failed, RolledBack)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_the_whole_lifecycle() {
        let path = [
            (TriggerKind::ValidatePass, ArtifactStatus::Validated),
            (TriggerKind::Approve, ArtifactStatus::Approved),
            (TriggerKind::Deploy, ArtifactStatus::Deployed),
            (TriggerKind::Activate, ArtifactStatus::Active),
            (TriggerKind::Deprecate, ArtifactStatus::Deprecated),
        ];

        let mut status = ArtifactStatus::Uploaded;
        for (trigger, expected) in path {
            status = next_status(status, trigger).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn validate_fail_loops_on_uploaded() {
        assert_eq!(
            next_status(ArtifactStatus::Uploaded, TriggerKind::ValidateFail),
            Some(ArtifactStatus::Uploaded)
        );
        assert_eq!(
            next_status(ArtifactStatus::Validated, TriggerKind::ValidateFail),
            None
        );
    }

    #[test]
    fn approved_artifact_cannot_be_rejected() {
        assert_eq!(next_status(ArtifactStatus::Approved, TriggerKind::Reject), None);
    }

    #[test]
    fn terminal_statuses_accept_nothing() {
        assert!(allowed_triggers(ArtifactStatus::Rejected).is_empty());
        assert!(allowed_triggers(ArtifactStatus::Deprecated).is_empty());
    }

    #[test]
    fn validated_offers_approve_and_reject() {
        assert_eq!(
            allowed_triggers(ArtifactStatus::Validated),
            vec![TriggerKind::Approve, TriggerKind::Reject]
        );
    }

    #[test]
    fn rolled_back_only_follows_failed() {
        for from in DeploymentStatus::ALL {
            assert_eq!(
                deployment_transition_allowed(from, DeploymentStatus::RolledBack),
                from == DeploymentStatus::Failed
            );
        }
    }

    #[test]
    fn terminal_attempt_statuses_do_not_move_back() {
        assert!(!deployment_transition_allowed(
            DeploymentStatus::Completed,
            DeploymentStatus::Running
        ));
        assert!(!deployment_transition_allowed(
            DeploymentStatus::RolledBack,
            DeploymentStatus::Failed
        ));
        assert!(!deployment_transition_allowed(
            DeploymentStatus::Pending,
            DeploymentStatus::Completed
        ));
    }
}
