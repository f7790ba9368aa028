// ABOUTME: Black-box command executor interface for the ledger network CLI.
// ABOUTME: Defines the command spec, captured output and the transient/permanent failure classes.

mod process;

pub use process::ProcessExecutor;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ErrorKind;

/// Longest stdout/stderr excerpt kept in a step message.
pub const MAX_EXCERPT_CHARS: usize = 2000;

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished program left behind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stderr if it has anything to say, else stdout; trimmed and cut to the
    /// last [`MAX_EXCERPT_CHARS`] characters.
    pub fn excerpt(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        tail_chars(text, MAX_EXCERPT_CHARS)
    }
}

fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max).collect();
    format!("...{tail}")
}

/// A failed invocation, already classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandFailure {
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// The remote side reported itself temporarily unreachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("exited with status {exit_code}: {excerpt}")]
    Exit { exit_code: i32, excerpt: String },
}

impl CommandFailure {
    /// Classify a non-zero exit by what the program printed.
    pub fn from_output(output: &CommandOutput) -> Self {
        let excerpt = output.excerpt();
        let haystack = format!("{}\n{}", output.stderr, output.stdout).to_ascii_lowercase();

        if haystack.contains("connection refused") {
            CommandFailure::ConnectionRefused(excerpt)
        } else if haystack.contains("connection reset") || haystack.contains("broken pipe") {
            CommandFailure::ConnectionReset(excerpt)
        } else if haystack.contains("deadline exceeded") || haystack.contains("unavailable") {
            CommandFailure::Unavailable(excerpt)
        } else {
            CommandFailure::Exit {
                exit_code: output.exit_code,
                excerpt,
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CommandFailure::Timeout(_)
                | CommandFailure::ConnectionRefused(_)
                | CommandFailure::ConnectionReset(_)
                | CommandFailure::Unavailable(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_transient() {
            ErrorKind::Transient
        } else {
            ErrorKind::Permanent
        }
    }
}

/// Runs one command to completion.
///
/// Implementations must stop the command when the returned future is dropped
/// or when `timeout` elapses.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandOutput, CommandFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn grpc_dial_errors_are_transient() {
        let f = CommandFailure::from_output(&failed(
            "Error: failed to dial peer0:7051: connection refused",
        ));
        assert!(matches!(f, CommandFailure::ConnectionRefused(_)));
        assert!(f.is_transient());

        let f = CommandFailure::from_output(&failed("rpc error: code = Unavailable desc = transport is closing"));
        assert!(f.is_transient());
    }

    #[test]
    fn endorsement_rejection_is_permanent() {
        let f = CommandFailure::from_output(&failed(
            "Error: proposal failed with status: 500 - failed to invoke backing implementation",
        ));
        assert_eq!(f.kind(), ErrorKind::Permanent);
        assert!(f.to_string().starts_with("exited with status 1"));
    }

    #[test]
    fn excerpt_prefers_stderr_and_keeps_the_tail() {
        let output = CommandOutput {
            exit_code: 1,
            stdout: "ignored".to_string(),
            stderr: format!("{}END", "x".repeat(MAX_EXCERPT_CHARS)),
        };
        let excerpt = output.excerpt();
        assert!(excerpt.starts_with("..."));
        assert!(excerpt.ends_with("END"));
        assert_eq!(excerpt.chars().count(), MAX_EXCERPT_CHARS + 3);
    }

    #[test]
    fn excerpt_falls_back_to_stdout() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: "  Installed remotely: package_id:abc  \n".to_string(),
            stderr: "   ".to_string(),
        };
        assert_eq!(output.excerpt(), "Installed remotely: package_id:abc");
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = CommandSpec::new("peer")
            .args(["lifecycle", "chaincode", "install"])
            .arg("fabcar.tar.gz");
        assert_eq!(
            spec.command_line(),
            "peer lifecycle chaincode install fabcar.tar.gz"
        );
    }
}
