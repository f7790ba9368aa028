// ABOUTME: Ordered per-attempt step log with status and timestamps.
// ABOUTME: Enforces strict step ordering; progress and current step are derived on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named unit of work within an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub order: usize,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub retry_count: u32,
}

impl StepRecord {
    pub fn pending(name: impl Into<String>, order: usize) -> Self {
        Self {
            name: name.into(),
            order,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            message: None,
            retry_count: 0,
        }
    }

    /// A record that is already finished, as produced by rollback compensations.
    pub fn finished(
        name: impl Into<String>,
        order: usize,
        status: StepStatus,
        started_at: DateTime<Utc>,
        message: impl Into<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            name: name.into(),
            order,
            status,
            started_at: Some(started_at),
            completed_at: Some(Utc::now()),
            message: Some(message.into()),
            retry_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("step '{step}' cannot start before '{predecessor}' completes")]
    OutOfOrder { step: String, predecessor: String },

    #[error("step '{step}' cannot move from {from} to {to}")]
    IllegalChange {
        step: String,
        from: StepStatus,
        to: StepStatus,
    },
}

/// The step log for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepTracker {
    steps: Vec<StepRecord>,
}

impl StepTracker {
    /// A tracker with every named step Pending, in the given order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = names
            .into_iter()
            .enumerate()
            .map(|(order, name)| StepRecord::pending(name, order))
            .collect();
        Self { steps }
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn get(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Mark `name` InProgress. Every earlier step must be Completed and the
    /// step itself must still be Pending.
    pub fn record_step_start(&mut self, name: &str) -> Result<&StepRecord, TrackerError> {
        let index = self.index_of(name)?;

        if let Some(blocking) = self.steps[..index]
            .iter()
            .find(|s| s.status != StepStatus::Completed)
        {
            return Err(TrackerError::OutOfOrder {
                step: name.to_string(),
                predecessor: blocking.name.clone(),
            });
        }

        let step = &mut self.steps[index];
        if step.status != StepStatus::Pending {
            return Err(TrackerError::IllegalChange {
                step: name.to_string(),
                from: step.status,
                to: StepStatus::InProgress,
            });
        }

        step.status = StepStatus::InProgress;
        step.started_at = Some(Utc::now());
        Ok(&self.steps[index])
    }

    /// Finish an InProgress step as Completed or Failed.
    pub fn record_step_result(
        &mut self,
        name: &str,
        status: StepStatus,
        message: impl Into<String>,
        retry_count: u32,
    ) -> Result<&StepRecord, TrackerError> {
        let index = self.index_of(name)?;
        let step = &mut self.steps[index];

        if step.status != StepStatus::InProgress || !status.is_finished() {
            return Err(TrackerError::IllegalChange {
                step: name.to_string(),
                from: step.status,
                to: status,
            });
        }

        step.status = status;
        step.completed_at = Some(Utc::now());
        step.message = Some(message.into());
        step.retry_count = retry_count;
        Ok(&self.steps[index])
    }

    /// Completed steps over total, floored to a whole percent.
    pub fn percent_complete(&self) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        (completed * 100 / self.steps.len()) as u8
    }

    /// The step that is running, or that stopped the attempt, or that runs next.
    /// `None` once every step has completed.
    pub fn current_step(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|s| matches!(s.status, StepStatus::InProgress | StepStatus::Failed))
            .or_else(|| self.steps.iter().find(|s| s.status == StepStatus::Pending))
    }

    /// Completed steps, oldest first.
    pub fn completed(&self) -> impl DoubleEndedIterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
    }

    /// Replace the record with the same order index, or append it.
    pub(crate) fn upsert(&mut self, record: StepRecord) {
        match self.steps.iter_mut().find(|s| s.order == record.order) {
            Some(existing) => *existing = record,
            None => {
                self.steps.push(record);
                self.steps.sort_by_key(|s| s.order);
            }
        }
    }

    fn index_of(&self, name: &str) -> Result<usize, TrackerError> {
        self.steps
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| TrackerError::UnknownStep(name.to_string()))
    }
}
