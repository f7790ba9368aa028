// ABOUTME: The artifact record and the submission that creates it.
// ABOUTME: Records are only mutated by applying a trigger, which yields a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::authz::Actor;
use crate::types::{ArtifactId, ArtifactName};

use super::error::LifecycleError;
use super::status::{ArtifactStatus, Trigger};

const MAX_VERSION_LEN: usize = 20;
const DEFAULT_LANGUAGE: &str = "golang";

/// A request to register a new artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub name: ArtifactName,
    pub version: String,
    /// Where the packaged source lives (a path or URL the step commands understand).
    pub content_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Submission {
    pub fn new(name: ArtifactName, version: impl Into<String>, content_ref: impl Into<String>) -> Self {
        Self {
            name,
            version: version.into(),
            content_ref: content_ref.into(),
            description: None,
            language: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), LifecycleError> {
        let version = self.version.as_str();
        if version.is_empty() {
            return Err(LifecycleError::InvalidSubmission(
                "version cannot be empty".to_string(),
            ));
        }
        if version.len() > MAX_VERSION_LEN {
            return Err(LifecycleError::InvalidSubmission(format!(
                "version exceeds {MAX_VERSION_LEN} characters"
            )));
        }
        if let Some(c) = version
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+')))
        {
            return Err(LifecycleError::InvalidSubmission(format!(
                "invalid character in version: '{c}'"
            )));
        }
        if self.content_ref.trim().is_empty() {
            return Err(LifecycleError::InvalidSubmission(
                "content reference cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A named, versioned unit of submitted code and where it stands in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub name: ArtifactName,
    pub version: String,
    pub content_ref: String,
    pub description: Option<String>,
    pub language: String,
    pub status: ArtifactStatus,
    pub submitted_by: String,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
    /// Errors from the most recent failed validation.
    pub validation_errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
}

impl Artifact {
    pub(crate) fn from_submission(submission: Submission, submitter: &Actor) -> Self {
        let now = Utc::now();
        Self {
            id: ArtifactId::generate(),
            name: submission.name,
            version: submission.version,
            content_ref: submission.content_ref,
            description: submission.description,
            language: submission
                .language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            status: ArtifactStatus::Uploaded,
            submitted_by: submitter.id.clone(),
            approved_by: None,
            rejection_reason: None,
            validation_errors: Vec::new(),
            created_at: now,
            last_transition_at: now,
        }
    }

    /// The record after `trigger` moved it to `next`.
    pub(crate) fn with_transition(&self, trigger: &Trigger, next: ArtifactStatus, actor: &Actor) -> Self {
        let mut updated = self.clone();
        updated.status = next;
        updated.last_transition_at = Utc::now();

        match trigger {
            Trigger::ValidatePass => updated.validation_errors.clear(),
            Trigger::ValidateFail { errors } => updated.validation_errors = errors.clone(),
            Trigger::Approve => updated.approved_by = Some(actor.id.clone()),
            Trigger::Reject { reason } => updated.rejection_reason = Some(reason.clone()),
            Trigger::Deploy | Trigger::Activate | Trigger::Deprecate => {}
        }

        updated
    }

    /// Display label, e.g. `asset-transfer@1.2.0`.
    pub fn label(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}
