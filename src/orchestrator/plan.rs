// ABOUTME: Step plan resolved from configuration: commands, targets, captures and compensations.
// ABOUTME: Renders `{var}` placeholders per attempt from artifact fields, config vars and captured outputs.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{CaptureConfig, Config, EnvValue, StepConfig, resolve_env_map};
use crate::error::Result;
use crate::executor::{CommandOutput, CommandSpec};
use crate::lifecycle::Artifact;

use super::DeploymentAttempt;

pub type Vars = BTreeMap<String, String>;

/// A program with templated arguments and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandTemplate {
    pub fn render(&self, vars: &Vars) -> CommandSpec {
        CommandSpec {
            program: render(&self.program, vars),
            args: self.args.iter().map(|a| render(a, vars)).collect(),
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), render(v, vars)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub name: String,
    pub target: String,
    pub command: CommandTemplate,
    pub timeout: Option<Duration>,
    pub capture: Option<CaptureConfig>,
    pub compensation: Option<CommandTemplate>,
}

impl PlannedStep {
    /// The value this step's capture finds in `output`: the text after the
    /// marker on the first stdout line containing it, else the first stderr line.
    pub fn capture_from(&self, output: &CommandOutput) -> Option<(String, String)> {
        let capture = self.capture.as_ref()?;
        output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .find_map(|line| {
                let at = line.find(&capture.after)?;
                let value = line[at + capture.after.len()..].trim();
                (!value.is_empty()).then(|| (capture.var.clone(), value.to_string()))
            })
    }
}

/// The ordered steps every attempt runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    steps: Vec<PlannedStep>,
    vars: Vars,
}

impl StepPlan {
    /// Resolve environment references and merge shared settings into each step.
    pub fn from_config(config: &Config) -> Result<Self> {
        let shared_env = resolve_env_map(&config.env)?;
        let vars = resolve_env_map(&config.vars)?;

        let steps = config
            .steps
            .iter()
            .map(|step| plan_step(config, step, &shared_env))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { steps, vars })
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&PlannedStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    /// Template variables for one attempt. Built-ins win over config vars;
    /// captured outputs are added last. Config validation keeps capture
    /// names clear of both.
    pub fn variables(&self, artifact: &Artifact, attempt: &DeploymentAttempt) -> Vars {
        let mut vars = self.vars.clone();
        vars.insert("name".to_string(), artifact.name.to_string());
        vars.insert("version".to_string(), artifact.version.clone());
        vars.insert("content".to_string(), artifact.content_ref.clone());
        vars.insert("language".to_string(), artifact.language.clone());
        vars.insert("segment".to_string(), attempt.segment.to_string());
        vars.insert("attempt".to_string(), attempt.id.to_string());
        for (key, value) in &attempt.outputs {
            vars.entry(key.clone()).or_insert_with(|| value.clone());
        }
        vars
    }
}

fn plan_step(config: &Config, step: &StepConfig, shared_env: &BTreeMap<String, String>) -> Result<PlannedStep> {
    let env = merged_env(shared_env, &step.env)?;

    let compensation = step
        .compensate
        .as_ref()
        .map(|c| -> Result<CommandTemplate> {
            Ok(CommandTemplate {
                program: c.program.clone(),
                args: c.args.clone(),
                env: merged_env(&env, &c.env)?,
            })
        })
        .transpose()?;

    Ok(PlannedStep {
        name: step.name.clone(),
        target: config.target_for(step).to_string(),
        command: CommandTemplate {
            program: step.program.clone(),
            args: step.args.clone(),
            env,
        },
        timeout: step.timeout,
        capture: step.capture.clone(),
        compensation,
    })
}

fn merged_env(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, EnvValue>,
) -> Result<BTreeMap<String, String>> {
    let mut env = base.clone();
    env.extend(resolve_env_map(overrides)?);
    Ok(env)
}

/// Replace `{key}` with `vars[key]`. Unknown keys and braces that don't wrap
/// a plain identifier are left untouched.
pub fn render(template: &str, vars: &Vars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find('}') {
            Some(close) if is_identifier(&after[..close]) => {
                let key = &after[..close];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
