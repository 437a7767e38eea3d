//! Job state machine and the records handed to callers.

use std::fmt;

use serde::{Deserialize, Serialize};
use tripod_core::identifiers::JobToken;
use tripod_core::process::ProcessOutput;
use tripod_core::types::Timestamp;

/// Lifecycle state of a job.
///
/// `Pending -> Running -> {Succeeded, Failed}`. A timed-out wait is not a
/// job state; it is reported to the waiting caller only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether moving from `self` to `next` keeps the state machine monotonic.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a run. Written once, never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_secs: f64,
}

impl JobOutcome {
    /// Exit code 0 succeeds; anything else, including no exit code at all,
    /// fails.
    pub fn from_output(output: ProcessOutput) -> Self {
        let state = if output.success() {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        Self {
            state,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            duration_secs: output.duration_secs,
        }
    }

    /// Trimmed stdout when the program rejected its input.
    pub fn input_error(&self, bad_input_exit_code: i32) -> Option<String> {
        (self.exit_code == Some(bad_input_exit_code)).then(|| self.stdout.trim().to_string())
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub token: JobToken,
    pub state: JobState,
    /// OS process id passed through the configured mask.
    pub masked_pid: Option<i128>,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub outcome: Option<JobOutcome>,
    /// Program output explaining why the input was rejected.
    pub input_error: Option<String>,
    /// Recent progress output of a running job, with server paths removed.
    /// Filled in by the caller that owns the redaction rules.
    pub progress: Option<String>,
}
