// ABOUTME: Rollback of a failed attempt: compensates completed steps newest first.
// ABOUTME: Compensation failures are recorded and warned about; the attempt always ends RolledBack.

use chrono::Utc;

use crate::authz::Actor;
use crate::broadcast::{ProgressEvent, Topic};
use crate::diagnostics::{Diagnostics, Warning};
use crate::lifecycle::{DeploymentStatus, TriggerKind};
use crate::tracker::{StepRecord, StepStatus};
use crate::types::AttemptId;

use super::attempt::DeploymentAttempt;
use super::claim::RunningClaim;
use super::engine::Inner;
use super::error::OrchestratorError;
use super::report::RollbackReport;

const NO_COMPENSATION: &str = "no compensating action configured";

impl Inner {
    pub(super) async fn rollback(&self, id: &AttemptId, actor: &Actor) -> Result<RollbackReport, OrchestratorError> {
        self.machine.authorize(actor, TriggerKind::Deploy)?;

        let attempt = self.load_attempt(id).await?;
        match attempt.status {
            DeploymentStatus::RolledBack => return Ok(RollbackReport::clean(attempt.id)),
            DeploymentStatus::Failed => {}
            status => {
                return Err(OrchestratorError::NotRollbackable {
                    attempt: attempt.id,
                    status,
                });
            }
        }

        let claim = RunningClaim::acquire(self.store.clone(), attempt.key(), attempt.id.clone()).await?;

        // Another rollback may have finished between the read and the claim.
        let mut attempt = match self.load_attempt(id).await {
            Ok(a) if a.status == DeploymentStatus::Failed => a,
            outcome => {
                claim.release().await?;
                return match outcome {
                    Ok(a) if a.status == DeploymentStatus::RolledBack => Ok(RollbackReport::clean(a.id)),
                    Ok(a) => Err(OrchestratorError::NotRollbackable {
                        attempt: a.id,
                        status: a.status,
                    }),
                    Err(e) => Err(e),
                };
            }
        };

        tracing::info!(attempt = %attempt.id, actor = %actor, "rollback started");
        let mut diag = Diagnostics::default();

        if let Err(e) = self.compensate(&mut attempt, &mut diag).await {
            claim.release().await?;
            return Err(e);
        }

        attempt.transition(DeploymentStatus::RolledBack)?;
        let persisted = self.store.put_attempt(&attempt).await;
        claim.release().await?;
        persisted?;

        tracing::info!(
            attempt = %attempt.id,
            compensated = attempt.compensations.len(),
            warnings = diag.warnings().len(),
            "rollback finished"
        );
        self.publish_attempt(&attempt);

        Ok(RollbackReport {
            attempt_id: attempt.id,
            warnings: diag.into_warnings(),
        })
    }

    async fn compensate(&self, attempt: &mut DeploymentAttempt, diag: &mut Diagnostics) -> Result<(), OrchestratorError> {
        let completed: Vec<String> = attempt
            .steps
            .completed()
            .map(|s| s.name.clone())
            .collect();

        let artifact = self.machine.artifact(&attempt.artifact_id).await?;
        let vars = self.plan.variables(&artifact, attempt);

        for (order, name) in completed.iter().rev().enumerate() {
            let started_at = Utc::now();
            let planned = self.plan.step(name);

            let record = match planned.and_then(|step| step.compensation.as_ref().map(|c| (step, c))) {
                None => StepRecord::finished(name, order, StepStatus::Completed, started_at, NO_COMPENSATION, 0),
                Some((step, compensation)) => {
                    let spec = compensation.render(&vars);
                    match self.executor.call(&step.target, &spec, &self.policy_for(step)).await {
                        Ok(success) => StepRecord::finished(
                            name,
                            order,
                            StepStatus::Completed,
                            started_at,
                            success.output.excerpt(),
                            success.attempts.saturating_sub(1),
                        ),
                        Err(err) => {
                            diag.warn(Warning::compensation_failed(name, &err));
                            StepRecord::finished(
                                name,
                                order,
                                StepStatus::Failed,
                                started_at,
                                format!("{}: {err}", err.kind()),
                                err.attempts().saturating_sub(1),
                            )
                        }
                    }
                }
            };

            attempt.compensations.push(record.clone());
            self.store.put_attempt(attempt).await?;
            self.broadcaster.publish(
                &Topic::Deployment(attempt.id.clone()),
                &ProgressEvent::CompensationRecorded {
                    attempt_id: attempt.id.clone(),
                    step: record,
                },
            );
        }

        Ok(())
    }
}
