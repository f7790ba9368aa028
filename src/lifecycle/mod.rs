// ABOUTME: Lifecycle state machine for artifacts and the deployment status sub-machine.
// ABOUTME: Status enums, the transition tables, the artifact record and the machine that applies triggers.

mod artifact;
mod error;
mod machine;
mod status;
mod transitions;

pub use artifact::{Artifact, Submission};
pub use error::LifecycleError;
pub use machine::LifecycleMachine;
pub use status::{ArtifactStatus, DeploymentStatus, Trigger, TriggerKind, UnknownTrigger};
pub use transitions::{allowed_triggers, deployment_transition_allowed, next_status, target_status};
