// ABOUTME: Artifact and deployment status enums plus the trigger vocabulary.
// ABOUTME: Triggers are a closed enum so every table over them is checked for exhaustiveness.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of an artifact along its approval and rollout path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Uploaded,
    Validated,
    Approved,
    Rejected,
    Deployed,
    Active,
    Deprecated,
}

impl ArtifactStatus {
    pub const ALL: [ArtifactStatus; 7] = [
        ArtifactStatus::Uploaded,
        ArtifactStatus::Validated,
        ArtifactStatus::Approved,
        ArtifactStatus::Rejected,
        ArtifactStatus::Deployed,
        ArtifactStatus::Active,
        ArtifactStatus::Deprecated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStatus::Uploaded => "uploaded",
            ArtifactStatus::Validated => "validated",
            ArtifactStatus::Approved => "approved",
            ArtifactStatus::Rejected => "rejected",
            ArtifactStatus::Deployed => "deployed",
            ArtifactStatus::Active => "active",
            ArtifactStatus::Deprecated => "deprecated",
        }
    }

    /// Rejected and Deprecated have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArtifactStatus::Rejected | ArtifactStatus::Deprecated)
    }

    /// Position along the lifecycle partial order. Rejected branches off
    /// Validated, so it shares rank with Approved.
    pub fn rank(&self) -> u8 {
        match self {
            ArtifactStatus::Uploaded => 0,
            ArtifactStatus::Validated => 1,
            ArtifactStatus::Approved | ArtifactStatus::Rejected => 2,
            ArtifactStatus::Deployed => 3,
            ArtifactStatus::Active => 4,
            ArtifactStatus::Deprecated => 5,
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    RolledBack,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 5] = [
        DeploymentStatus::Pending,
        DeploymentStatus::Running,
        DeploymentStatus::Completed,
        DeploymentStatus::Failed,
        DeploymentStatus::RolledBack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Completed | DeploymentStatus::Failed | DeploymentStatus::RolledBack
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to move an artifact along its lifecycle.
///
/// Triggers that need extra data carry it; the transition and authorization
/// tables work on the data-free [`TriggerKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    ValidatePass,
    ValidateFail { errors: Vec<String> },
    Approve,
    Reject { reason: String },
    Deploy,
    Activate,
    Deprecate,
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::ValidatePass => TriggerKind::ValidatePass,
            Trigger::ValidateFail { .. } => TriggerKind::ValidateFail,
            Trigger::Approve => TriggerKind::Approve,
            Trigger::Reject { .. } => TriggerKind::Reject,
            Trigger::Deploy => TriggerKind::Deploy,
            Trigger::Activate => TriggerKind::Activate,
            Trigger::Deprecate => TriggerKind::Deprecate,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

/// Data-free trigger names, plus `Submit` which only the authorization table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    Submit,
    ValidatePass,
    ValidateFail,
    Approve,
    Reject,
    Deploy,
    Activate,
    Deprecate,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 8] = [
        TriggerKind::Submit,
        TriggerKind::ValidatePass,
        TriggerKind::ValidateFail,
        TriggerKind::Approve,
        TriggerKind::Reject,
        TriggerKind::Deploy,
        TriggerKind::Activate,
        TriggerKind::Deprecate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Submit => "submit",
            TriggerKind::ValidatePass => "validate-pass",
            TriggerKind::ValidateFail => "validate-fail",
            TriggerKind::Approve => "approve",
            TriggerKind::Reject => "reject",
            TriggerKind::Deploy => "deploy",
            TriggerKind::Activate => "activate",
            TriggerKind::Deprecate => "deprecate",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown trigger: {0}")]
pub struct UnknownTrigger(String);

impl FromStr for TriggerKind {
    type Err = UnknownTrigger;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownTrigger(s.to_string()))
    }
}
