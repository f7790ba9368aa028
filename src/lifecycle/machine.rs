// ABOUTME: The artifact state machine: authorize, guard, compare-and-swap, then notify and audit.
// ABOUTME: The only code path that changes an artifact's status.

use std::sync::Arc;

use crate::authz::{Actor, Authorizer};
use crate::broadcast::{ProgressBroadcaster, ProgressEvent, Topic};
use crate::store::{LifecycleStore, WriteResult};
use crate::types::ArtifactId;

use super::artifact::{Artifact, Submission};
use super::error::LifecycleError;
use super::status::{ArtifactStatus, Trigger, TriggerKind};
use super::transitions::{next_status, target_status};

pub struct LifecycleMachine {
    store: Arc<dyn LifecycleStore>,
    authorizer: Arc<dyn Authorizer>,
    broadcaster: Arc<ProgressBroadcaster>,
}

impl LifecycleMachine {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        authorizer: Arc<dyn Authorizer>,
        broadcaster: Arc<ProgressBroadcaster>,
    ) -> Self {
        Self {
            store,
            authorizer,
            broadcaster,
        }
    }

    /// Check the authorization table; denials are logged as security events.
    pub fn authorize(&self, actor: &Actor, trigger: TriggerKind) -> Result<(), LifecycleError> {
        if self.authorizer.is_authorized(actor.role, trigger) {
            return Ok(());
        }

        tracing::warn!(
            target: "security",
            actor = %actor.id,
            role = %actor.role,
            %trigger,
            "authorization denied"
        );
        Err(LifecycleError::Unauthorized {
            role: actor.role,
            trigger,
        })
    }

    /// Register a new artifact in Uploaded.
    pub async fn submit(&self, submission: Submission, actor: &Actor) -> Result<Artifact, LifecycleError> {
        self.authorize(actor, TriggerKind::Submit)?;
        submission.validate()?;

        let artifact = Artifact::from_submission(submission, actor);
        self.store.insert_artifact(&artifact).await?;

        audit(&artifact, "CHAINCODE_UPLOADED", actor);
        Ok(artifact)
    }

    pub async fn artifact(&self, id: &ArtifactId) -> Result<Artifact, LifecycleError> {
        self.store
            .get_artifact(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    /// Apply `trigger` to the artifact, returning the record as stored afterwards.
    ///
    /// Repeating a trigger whose target status the artifact already has is a
    /// no-op that returns the current record.
    pub async fn request_transition(
        &self,
        id: &ArtifactId,
        trigger: Trigger,
        actor: &Actor,
    ) -> Result<Artifact, LifecycleError> {
        let kind = trigger.kind();
        self.authorize(actor, kind)?;

        let current = self.artifact(id).await?;

        if target_status(kind) == Some(current.status) {
            tracing::debug!(artifact = %id, status = %current.status, %kind, "transition already applied");
            return Ok(current);
        }

        let next = next_status(current.status, kind).ok_or(LifecycleError::InvalidTransition {
            from: current.status,
            trigger: kind,
        })?;

        let updated = current.with_transition(&trigger, next, actor);

        if let WriteResult::PreconditionFailed { current: found } =
            self.store.cas_update_artifact(current.status, &updated).await?
        {
            return Err(LifecycleError::ConcurrentModification {
                artifact: id.clone(),
                expected: current.status,
                found: found.map_or_else(|| "nothing".to_string(), |s| s.to_string()),
            });
        }

        let action = match kind {
            TriggerKind::ValidateFail => "CHAINCODE_VALIDATION_FAILED".to_string(),
            _ => format!("CHAINCODE_{}", next.as_str().to_ascii_uppercase()),
        };
        audit(&updated, &action, actor);

        self.broadcaster.publish(
            &Topic::Artifact(id.clone()),
            &ProgressEvent::ArtifactStatusChanged {
                artifact_id: id.clone(),
                label: updated.label(),
                from: current.status,
                to: next,
                trigger: kind,
                actor: actor.id.clone(),
                at: updated.last_transition_at,
            },
        );

        Ok(updated)
    }

    /// Deprecate every other Active artifact sharing `active`'s name.
    pub async fn deprecate_superseded(&self, active: &Artifact) -> Result<Vec<ArtifactId>, LifecycleError> {
        let system = Actor::system();
        let mut deprecated = Vec::new();

        for other in self.store.list_artifacts_by_name(active.name.as_str()).await? {
            if other.id == active.id || other.status != ArtifactStatus::Active {
                continue;
            }
            match self
                .request_transition(&other.id, Trigger::Deprecate, &system)
                .await
            {
                Ok(_) => deprecated.push(other.id),
                // Someone else already moved it on.
                Err(LifecycleError::ConcurrentModification { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(deprecated)
    }
}

fn audit(artifact: &Artifact, action: &str, actor: &Actor) {
    tracing::info!(
        target: "audit",
        action,
        actor = %actor.id,
        role = %actor.role,
        artifact = %artifact.id,
        label = %artifact.label(),
        status = %artifact.status,
        "chaincode lifecycle"
    );
}
