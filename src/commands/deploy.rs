// ABOUTME: Deploy command implementation.
// ABOUTME: Submits, validates and approves a package, then runs and renders one deployment attempt.

use ccdeploy::authz::{Actor, Role};
use ccdeploy::broadcast::Subscription;
use ccdeploy::config::Config;
use ccdeploy::error::{Error, Result};
use ccdeploy::lifecycle::{DeploymentStatus, Submission, Trigger};
use ccdeploy::orchestrator::Orchestrator;
use ccdeploy::output::Output;
use ccdeploy::types::{ArtifactName, SegmentName};

/// What to deploy and as whom.
pub struct DeployRequest {
    pub name: ArtifactName,
    pub version: String,
    pub source: String,
    pub language: String,
    pub segment: SegmentName,
    pub actor: String,
    pub role: Role,
    pub rollback_on_failure: bool,
}

pub async fn deploy(config: Config, request: DeployRequest, mut output: Output) -> Result<()> {
    output.start_timer();
    let orchestrator = Orchestrator::builder(config).build()?;
    let actor = Actor::new(request.actor, request.role);

    output.progress(&format!(
        "Deploying {}@{} to {}",
        request.name, request.version, request.segment
    ));

    let submission =
        Submission::new(request.name, request.version, request.source).language(request.language);
    let artifact_id = orchestrator.submit_artifact(submission, &actor).await?;
    let mut artifact_events = orchestrator.subscribe_to_artifact(&artifact_id);

    orchestrator
        .request_transition(&artifact_id, Trigger::ValidatePass, &Actor::system())
        .await?;
    orchestrator
        .request_transition(&artifact_id, Trigger::Approve, &actor)
        .await?;
    drain(&mut artifact_events, &output);

    // The attempt task is spawned but not yet polled on this single-threaded
    // runtime, so subscribing here sees every step event.
    let handle = orchestrator
        .start_deployment(&artifact_id, request.segment, &actor)
        .await?;
    let attempt_id = handle.attempt_id().clone();
    let mut events = orchestrator.subscribe_to_deployment(&attempt_id);
    drain(&mut artifact_events, &output);

    let finished = handle.wait();
    tokio::pin!(finished);
    let outcome = loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => output.event(&event),
            outcome = &mut finished => break outcome?,
        }
    };
    drain(&mut events, &output);
    drain(&mut artifact_events, &output);

    // Emit collected warnings
    for warning in &outcome.warnings {
        output.warning(&warning.message);
    }

    let status = outcome.status;
    if status == DeploymentStatus::Completed {
        let artifact = orchestrator.get_artifact(&artifact_id).await?;
        output.success(&format!(
            "Deployed {} (attempt {attempt_id}, now {})",
            artifact.label(),
            artifact.status
        ));
        return Ok(());
    }

    let view = orchestrator.get_deployment_status(&attempt_id).await?;
    let message = view
        .error
        .unwrap_or_else(|| "deployment did not complete".to_string());

    let mut final_status = status;
    if request.rollback_on_failure && status == DeploymentStatus::Failed {
        output.progress("  → Rolling back...");
        let report = orchestrator.rollback(&attempt_id, &actor).await?;
        drain(&mut events, &output);

        for warning in &report.warnings {
            output.warning(&warning.message);
        }
        final_status = DeploymentStatus::RolledBack;
    }

    Err(Error::DeploymentFailed {
        attempt: attempt_id.to_string(),
        status: final_status.to_string(),
        message,
    })
}

/// Render whatever is already buffered without waiting for more.
fn drain(subscription: &mut Subscription, output: &Output) {
    while let Some(event) = subscription.try_recv() {
        output.event(&event);
    }
}
