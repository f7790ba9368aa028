// ABOUTME: Call error types with SNAFU pattern.
// ABOUTME: Separates breaker rejections, exhausted retries and permanent command failures.

use snafu::Snafu;
use std::time::Duration;

use crate::error::ErrorKind;
use crate::executor::CommandFailure;

/// Why a guarded call did not produce a successful output.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CallError {
    /// The target's breaker refused; no command was run for this attempt.
    #[snafu(display("circuit for {target} is open, retry in {}s", retry_in.as_secs()))]
    CircuitOpen {
        target: String,
        retry_in: Duration,
        attempts: u32,
    },

    /// Every attempt failed transiently.
    #[snafu(display("{target}: gave up after {attempts} attempt(s): {source}"))]
    Exhausted {
        target: String,
        attempts: u32,
        source: CommandFailure,
    },

    /// A failure that retrying cannot fix.
    #[snafu(display("{target}: {source}"))]
    Permanent {
        target: String,
        attempts: u32,
        source: CommandFailure,
    },
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            CallError::Exhausted { .. } => ErrorKind::Transient,
            CallError::Permanent { .. } => ErrorKind::Permanent,
        }
    }

    /// Commands actually run before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            CallError::CircuitOpen { attempts, .. }
            | CallError::Exhausted { attempts, .. }
            | CallError::Permanent { attempts, .. } => *attempts,
        }
    }

    pub fn failure(&self) -> Option<&CommandFailure> {
        match self {
            CallError::CircuitOpen { .. } => None,
            CallError::Exhausted { source, .. } | CallError::Permanent { source, .. } => Some(source),
        }
    }
}
