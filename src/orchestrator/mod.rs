// ABOUTME: Deployment orchestration: attempts, running markers, step plans and rollback.
// ABOUTME: The Orchestrator ties the lifecycle machine, resilient executor and broadcaster together.

mod attempt;
mod claim;
mod engine;
mod error;
mod pipeline;
mod plan;
mod report;
mod rollback;

pub use attempt::{DeploymentAttempt, DeploymentStatusView};
pub use claim::{RunningClaim, RunningMarker};
pub use engine::{DeploymentHandle, Orchestrator, OrchestratorBuilder};
pub use error::OrchestratorError;
pub use plan::{CommandTemplate, PlannedStep, StepPlan, Vars, render};
pub use report::{DeploymentOutcome, RollbackReport};
