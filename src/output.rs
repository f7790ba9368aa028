// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Renders progress events in normal, quiet (CI) and JSON-lines modes.

use serde::Serialize;
use std::time::Instant;

use crate::broadcast::ProgressEvent;
use crate::tracker::StepStatus;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

impl OutputMode {
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Render one broadcast event. JSON mode prints the event itself.
    pub fn event(&self, event: &ProgressEvent) {
        match self.mode {
            OutputMode::Quiet => {}
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(event) {
                    println!("{json}");
                }
            }
            OutputMode::Normal => {
                if let Some(line) = describe(event) {
                    println!("{line}");
                }
            }
        }
    }

    /// Print a non-fatal warning to stderr.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit_stderr("warning", message),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "success",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.emit_stderr("error", message),
        }
    }

    fn emit_stderr(&self, event: &str, message: &str) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.duration(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            eprintln!("{json}");
        }
    }
}

/// Human-readable line for an event; `None` for events not worth a line.
pub fn describe(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::ArtifactStatusChanged {
            label, from, to, actor, ..
        } => Some(format!("  {label}: {from} → {to} (by {actor})")),
        ProgressEvent::AttemptStatusChanged {
            attempt_id,
            segment,
            status,
            percent_complete,
            error,
            ..
        } => Some(match error {
            Some(error) => format!("  attempt {attempt_id} on {segment}: {status} at {percent_complete}% ({error})"),
            None => format!("  attempt {attempt_id} on {segment}: {status} ({percent_complete}%)"),
        }),
        ProgressEvent::StepChanged {
            step,
            percent_complete,
            ..
        } => match step.status {
            StepStatus::Pending => None,
            StepStatus::InProgress => Some(format!("  → {}...", step.name)),
            StepStatus::Completed if step.retry_count > 0 => Some(format!(
                "  ✓ {} after {} retries ({percent_complete}%)",
                step.name, step.retry_count
            )),
            StepStatus::Completed => Some(format!("  ✓ {} ({percent_complete}%)", step.name)),
            StepStatus::Failed => Some(format!(
                "  ✗ {}: {}",
                step.name,
                step.message.as_deref().unwrap_or("failed")
            )),
        },
        ProgressEvent::CompensationRecorded { step, .. } => Some(format!(
            "  ↺ {} {}: {}",
            step.name,
            step.status,
            step.message.as_deref().unwrap_or_default()
        )),
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
