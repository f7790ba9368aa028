// ABOUTME: Application-wide error types for ccdeploy and the shared error-kind taxonomy.
// ABOUTME: Every engine error maps onto an ErrorKind so callers can branch without string matching.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::orchestrator::OrchestratorError;

/// Classification shared by every error the engine returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    InvalidTransition,
    Unauthorized,
    NotFound,
    Conflict,
    ConcurrentModification,
    AlreadyRunning,
    CircuitOpen,
    Transient,
    Permanent,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::AlreadyRunning => "already_running",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("deployment {attempt} ended {status}: {message}")]
    DeploymentFailed {
        attempt: String,
        status: String,
        message: String,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyExists(_) => ErrorKind::Conflict,
            Error::ConfigNotFound(_) => ErrorKind::NotFound,
            Error::MissingEnvVar(_) | Error::InvalidConfig(_) | Error::Yaml(_) => {
                ErrorKind::Validation
            }
            Error::Io(_) => ErrorKind::Storage,
            Error::Orchestrator(e) => e.kind(),
            Error::DeploymentFailed { .. } => ErrorKind::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
