// ABOUTME: One rollout step as configured: the command, its target and optional compensation.
// ABOUTME: Arguments are templates rendered per attempt; see orchestrator::plan.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::EnvValue;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub name: String,
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// Downstream target whose circuit breaker guards this step.
    /// Defaults to the top-level `target`.
    #[serde(default)]
    pub target: Option<String>,

    /// Per-call timeout override.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub capture: Option<CaptureConfig>,

    #[serde(default)]
    pub compensate: Option<CompensationConfig>,
}

/// Pull a value out of a successful step's stdout for later steps.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    pub var: String,
    /// The value is whatever follows this marker on the first line containing it.
    pub after: String,
}

/// The command that undoes a completed step during rollback.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompensationConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Added on top of the step's own environment.
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
}
