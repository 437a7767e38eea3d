//! Job status lookups: instant `poll` and a bounded `await_outcome`.

use std::sync::Arc;
use std::time::Duration;

use tripod_core::identifiers::JobToken;

use crate::error::DispatchError;
use crate::job::{JobState, JobSummary};
use crate::registry::JobRegistry;

/// Result of a bounded wait.
#[derive(Debug, Clone, PartialEq)]
pub enum AwaitOutcome {
    /// The job reached a terminal state within the timeout.
    Finished(JobSummary),
    /// The timeout elapsed first. The job keeps running.
    TimedOut(JobSummary),
}

impl AwaitOutcome {
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    pub fn summary(&self) -> &JobSummary {
        match self {
            Self::Finished(s) | Self::TimedOut(s) => s,
        }
    }

    pub fn into_summary(self) -> JobSummary {
        match self {
            Self::Finished(s) | Self::TimedOut(s) => s,
        }
    }
}

/// Read-only view over the job registry.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    registry: Arc<JobRegistry>,
}

impl StatusTracker {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Current state, without waiting.
    pub fn poll(&self, token: &JobToken) -> Result<JobState, DispatchError> {
        Ok(self.registry.get(token)?.state())
    }

    /// Current summary, without waiting.
    pub fn summary(&self, token: &JobToken) -> Result<JobSummary, DispatchError> {
        let record = self.registry.get(token)?;
        Ok(self.registry.summary(&record))
    }

    /// Wait up to `timeout` for the job to finish.
    ///
    /// Only the calling task is suspended. Timing out never touches the
    /// running process; waiting again later is fine.
    pub async fn await_outcome(
        &self,
        token: &JobToken,
        timeout: Duration,
    ) -> Result<AwaitOutcome, DispatchError> {
        let record = self.registry.get(token)?;
        let mut rx = record.subscribe();

        let finished = tokio::time::timeout(timeout, async {
            rx.wait_for(|state| state.is_terminal()).await.is_ok()
        })
        .await
        .unwrap_or(false);

        let summary = self.registry.summary(&record);
        if finished || summary.state.is_terminal() {
            Ok(AwaitOutcome::Finished(summary))
        } else {
            tracing::debug!(
                job_token = %token,
                state = %summary.state,
                timeout_ms = timeout.as_millis() as u64,
                "Await timed out",
            );
            Ok(AwaitOutcome::TimedOut(summary))
        }
    }
}
