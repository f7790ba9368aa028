// ABOUTME: Configuration types and parsing for ccdeploy.yml.
// ABOUTME: Handles YAML parsing, discovery, defaults and semantic validation.

mod breaker;
mod deserialize;
mod env_value;
mod init;
mod retry;
mod step;

pub use breaker::BreakerConfig;
pub use env_value::{EnvValue, resolve_env_map};
pub use init::init_config;
pub use retry::{BackoffConfig, RetryConfig};
pub use step::{CaptureConfig, CompensationConfig, StepConfig};

use crate::error::{Error, Result};
use deserialize::{deserialize_steps, deserialize_target};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "ccdeploy.yml";
pub const CONFIG_FILENAME_ALT: &str = "ccdeploy.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".ccdeploy/config.yml";

/// Template variables every attempt provides; configured vars and captures
/// may not shadow them.
pub const BUILTIN_VARS: [&str; 6] = ["name", "version", "segment", "content", "language", "attempt"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default downstream target for steps that don't name one.
    #[serde(default = "default_target", deserialize_with = "deserialize_target")]
    pub target: String,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_activate_on_success")]
    pub activate_on_success: bool,

    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,

    /// Extra template variables, available to every step as `{key}`.
    #[serde(default)]
    pub vars: BTreeMap<String, EnvValue>,

    /// Environment shared by every step command.
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    #[serde(deserialize_with = "deserialize_steps")]
    pub steps: NonEmpty<StepConfig>,
}

fn default_target() -> String {
    "peer-network".to_string()
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_activate_on_success() -> bool {
    true
}

fn default_subscriber_capacity() -> usize {
    64
}

impl Config {
    /// Parse and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Target whose breaker guards `step`.
    pub fn target_for<'a>(&'a self, step: &'a StepConfig) -> &'a str {
        step.target.as_deref().unwrap_or(&self.target)
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout.is_zero() {
            return Err(invalid("command_timeout must be greater than zero"));
        }
        if self.subscriber_capacity == 0 {
            return Err(invalid("subscriber_capacity must be at least 1"));
        }

        let breaker = &self.breaker;
        if breaker.failure_threshold == 0 {
            return Err(invalid("breaker.failure_threshold must be at least 1"));
        }
        if breaker.success_threshold == 0 {
            return Err(invalid("breaker.success_threshold must be at least 1"));
        }
        if breaker.half_open_max_calls == 0 {
            return Err(invalid("breaker.half_open_max_calls must be at least 1"));
        }

        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if let BackoffConfig::Exponential { base, max } = self.retry.backoff
            && base > max
        {
            return Err(invalid("retry.backoff.base cannot exceed retry.backoff.max"));
        }

        for var in self.vars.keys() {
            if BUILTIN_VARS.contains(&var.as_str()) {
                return Err(invalid(format!("vars.{var} shadows a built-in variable")));
            }
        }

        let mut seen = HashSet::new();
        for step in self.steps.iter() {
            if step.name.trim().is_empty() {
                return Err(invalid("step name cannot be empty"));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(invalid(format!("duplicate step name: {}", step.name)));
            }
            if step.timeout.is_some_and(|t| t.is_zero()) {
                return Err(invalid(format!("step {}: timeout must be greater than zero", step.name)));
            }
            if let Some(capture) = &step.capture {
                if capture.var.trim().is_empty() || capture.after.is_empty() {
                    return Err(invalid(format!(
                        "step {}: capture needs both var and after",
                        step.name
                    )));
                }
                if BUILTIN_VARS.contains(&capture.var.as_str()) {
                    return Err(invalid(format!(
                        "step {}: capture var {} shadows a built-in variable",
                        step.name, capture.var
                    )));
                }
                if self.vars.contains_key(&capture.var) {
                    return Err(invalid(format!(
                        "step {}: capture var {} shadows vars.{}",
                        step.name, capture.var, capture.var
                    )));
                }
            }
        }

        Ok(())
    }

    /// A Hyperledger Fabric `peer lifecycle` pipeline.
    pub fn template() -> Self {
        let step = |name: &str, args: &[&str]| StepConfig {
            name: name.to_string(),
            program: "peer".to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
            target: None,
            timeout: None,
            capture: None,
            compensate: None,
        };

        let mut package = step(
            "package",
            &[
                "lifecycle", "chaincode", "package", "{name}_{version}.tar.gz", "--path", "{content}",
                "--lang", "{language}", "--label", "{name}_{version}",
            ],
        );
        package.compensate = Some(CompensationConfig {
            program: "rm".to_string(),
            args: vec!["-f".to_string(), "{name}_{version}.tar.gz".to_string()],
            env: BTreeMap::new(),
        });

        let mut install = step(
            "install",
            &["lifecycle", "chaincode", "install", "{name}_{version}.tar.gz"],
        );
        install.timeout = Some(Duration::from_secs(300));
        install.capture = Some(CaptureConfig {
            var: "package_id".to_string(),
            after: "Chaincode code package identifier: ".to_string(),
        });

        let approve = step(
            "approve-for-org",
            &[
                "lifecycle", "chaincode", "approveformyorg", "-o", "{orderer}", "--channelID",
                "{segment}", "--name", "{name}", "--version", "{version}", "--package-id",
                "{package_id}", "--sequence", "{sequence}",
            ],
        );

        let commit = step(
            "commit",
            &[
                "lifecycle", "chaincode", "commit", "-o", "{orderer}", "--channelID", "{segment}",
                "--name", "{name}", "--version", "{version}", "--sequence", "{sequence}",
            ],
        );

        Config {
            target: default_target(),
            command_timeout: default_command_timeout(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            activate_on_success: default_activate_on_success(),
            subscriber_capacity: default_subscriber_capacity(),
            vars: BTreeMap::from([
                (
                    "orderer".to_string(),
                    EnvValue::FromEnv {
                        var: "ORDERER_ADDRESS".to_string(),
                        default: Some("localhost:7050".to_string()),
                    },
                ),
                ("sequence".to_string(), EnvValue::from("1")),
            ]),
            env: BTreeMap::from([(
                "CORE_PEER_ADDRESS".to_string(),
                EnvValue::FromEnv {
                    var: "CORE_PEER_ADDRESS".to_string(),
                    default: Some("localhost:7051".to_string()),
                },
            )]),
            steps: NonEmpty::from((package, vec![install, approve, commit])),
        }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig(message.into())
}
