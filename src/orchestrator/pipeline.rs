// ABOUTME: The per-attempt task: runs each planned step through the retrying executor in order.
// ABOUTME: Persists before broadcasting, promotes the artifact, then releases the running marker.

use std::sync::Arc;

use crate::authz::Actor;
use crate::broadcast::{ProgressEvent, Topic};
use crate::diagnostics::{Diagnostics, Warning};
use crate::lifecycle::{Artifact, ArtifactStatus, DeploymentStatus, LifecycleError, Trigger};
use crate::tracker::{StepRecord, StepStatus};

use super::attempt::DeploymentAttempt;
use super::claim::RunningClaim;
use super::engine::Inner;
use super::error::OrchestratorError;
use super::report::DeploymentOutcome;

impl Inner {
    pub(super) async fn run(
        self: Arc<Self>,
        mut attempt: DeploymentAttempt,
        artifact: Artifact,
        claim: RunningClaim,
    ) -> Result<DeploymentOutcome, OrchestratorError> {
        let mut diag = Diagnostics::default();

        let (status, error) = match self.execute_steps(&mut attempt, &artifact).await {
            Ok(()) => (DeploymentStatus::Completed, None),
            Err(message) => (DeploymentStatus::Failed, Some(message)),
        };

        if let Err(e) = attempt.transition(status) {
            tracing::error!(attempt = %attempt.id, error = %e, "attempt in unexpected state");
        }
        attempt.error = error;

        // Observers and the artifact only move once the outcome is durable.
        if let Err(source) = self.store.put_attempt(&attempt).await {
            tracing::error!(
                attempt = %attempt.id,
                status = %attempt.status,
                error = %source,
                "could not persist attempt outcome"
            );
            claim.keep();
            return Err(OrchestratorError::OutcomeNotPersisted {
                attempt: attempt.id,
                status: attempt.status,
                source,
            });
        }

        match &attempt.error {
            Some(error) => tracing::warn!(attempt = %attempt.id, %error, "deployment failed"),
            None => tracing::info!(attempt = %attempt.id, "deployment completed"),
        }
        self.publish_attempt(&attempt);

        if attempt.status == DeploymentStatus::Completed
            && let Err(e) = self.promote(&attempt).await
        {
            diag.warn(Warning::promotion(format!(
                "deployment {} completed but artifact {} was not promoted: {e}",
                attempt.id, attempt.artifact_id
            )));
        }

        if let Err(e) = claim.release().await {
            diag.warn(Warning::marker_release(format!(
                "running marker for {} not released: {e}",
                attempt.key()
            )));
        }

        Ok(DeploymentOutcome {
            attempt_id: attempt.id,
            status: attempt.status,
            warnings: diag.into_warnings(),
        })
    }

    /// Run every step in order, stopping at the first failure. The error is
    /// the attempt's terminal message.
    async fn execute_steps(&self, attempt: &mut DeploymentAttempt, artifact: &Artifact) -> Result<(), String> {
        for step in self.plan.steps() {
            let started = attempt
                .steps
                .record_step_start(&step.name)
                .map_err(|e| e.to_string())?
                .clone();
            self.persist_step(attempt, started).await?;
            tracing::info!(attempt = %attempt.id, step = %step.name, "step started");

            let spec = step.command.render(&self.plan.variables(artifact, attempt));
            let policy = self.policy_for(step);

            match self.executor.call(&step.target, &spec, &policy).await {
                Ok(success) => {
                    if let Some((var, value)) = step.capture_from(&success.output) {
                        tracing::debug!(attempt = %attempt.id, step = %step.name, %var, %value, "captured output");
                        attempt.outputs.insert(var, value);
                    }
                    let record = attempt
                        .steps
                        .record_step_result(
                            &step.name,
                            StepStatus::Completed,
                            success.output.excerpt(),
                            success.attempts.saturating_sub(1),
                        )
                        .map_err(|e| e.to_string())?
                        .clone();
                    self.persist_step(attempt, record).await?;
                    tracing::info!(attempt = %attempt.id, step = %step.name, tries = success.attempts, "step completed");
                }
                Err(err) => {
                    let message = format!("{}: {err}", err.kind());
                    let record = attempt
                        .steps
                        .record_step_result(
                            &step.name,
                            StepStatus::Failed,
                            message.clone(),
                            err.attempts().saturating_sub(1),
                        )
                        .map_err(|e| e.to_string())?
                        .clone();
                    self.persist_step(attempt, record).await?;
                    tracing::warn!(attempt = %attempt.id, step = %step.name, error = %message, "step failed");
                    return Err(format!("step {} failed: {message}", step.name));
                }
            }
        }
        Ok(())
    }

    async fn persist_step(&self, attempt: &DeploymentAttempt, record: StepRecord) -> Result<(), String> {
        self.store
            .append_step(&attempt.id, &record)
            .await
            .map_err(|e| format!("could not record step {}: {e}", record.name))?;

        self.broadcaster.publish(
            &Topic::Deployment(attempt.id.clone()),
            &ProgressEvent::StepChanged {
                attempt_id: attempt.id.clone(),
                step: record,
                percent_complete: attempt.percent_complete(),
            },
        );
        Ok(())
    }

    /// Approved → Deployed as the initiator, then optionally Active as the
    /// system, retiring the previously active version.
    async fn promote(&self, attempt: &DeploymentAttempt) -> Result<(), LifecycleError> {
        let mut artifact = self.machine.artifact(&attempt.artifact_id).await?;

        // A deployment to another segment may already have promoted it.
        if artifact.status == ArtifactStatus::Approved {
            artifact = self
                .machine
                .request_transition(&artifact.id, Trigger::Deploy, &attempt.initiator)
                .await?;
        }

        if self.activate_on_success && artifact.status == ArtifactStatus::Deployed {
            let active = self
                .machine
                .request_transition(&artifact.id, Trigger::Activate, &Actor::system())
                .await?;
            let retired = self.machine.deprecate_superseded(&active).await?;
            if !retired.is_empty() {
                tracing::info!(artifact = %active.label(), retired = retired.len(), "superseded versions deprecated");
            }
        }

        Ok(())
    }
}
