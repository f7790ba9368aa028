// ABOUTME: CommandExecutor that spawns local processes with tokio::process.
// ABOUTME: Children are killed when the call times out or its future is dropped.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{CommandExecutor, CommandFailure, CommandOutput, CommandSpec};

/// Runs commands as child processes of this one.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandOutput, CommandFailure> {
        tracing::debug!(command = %spec.command_line(), "spawning");

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandFailure::Spawn {
                program: spec.program.clone(),
                reason: e.to_string(),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CommandFailure::Spawn {
                    program: spec.program.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => return Err(CommandFailure::Timeout(timeout)),
        };

        Ok(CommandOutput {
            // Killed by a signal: no code.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
