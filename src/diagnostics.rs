// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment and rollback.
// ABOUTME: Collects problems that shouldn't fail an operation but should still be surfaced.

/// Collects non-fatal warnings during orchestration.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Hand the collected warnings to the caller.
    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during orchestration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A compensating action failed during rollback.
    pub fn compensation_failed(step: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            kind: WarningKind::CompensationFailed,
            message: format!("compensation for step {step} failed: {reason}"),
        }
    }

    /// The running marker could not be released (the pair stays blocked).
    pub fn marker_release(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::MarkerRelease,
            message: message.into(),
        }
    }

    /// A completed deployment could not move its artifact forward.
    pub fn promotion(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Promotion,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    CompensationFailed,
    MarkerRelease,
    Promotion,
}
