//! In-memory job registry shared by the pool and the status tracker.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use chrono::Utc;
use tokio::sync::watch;
use tripod_core::identifiers::{JobToken, MaskKey};
use tripod_core::types::Timestamp;

use crate::error::DispatchError;
use crate::job::{JobOutcome, JobState, JobSummary};

/// Shared record of one submitted job.
///
/// State changes go through a watch channel so waiters wake without
/// polling. Start data and the outcome are write-once; the outcome is
/// stored before the terminal state is published, so anyone who observes a
/// terminal state also sees the outcome.
#[derive(Debug)]
pub struct JobRecord {
    token: JobToken,
    workspace: PathBuf,
    submitted_at: Timestamp,
    state: watch::Sender<JobState>,
    started_at: OnceLock<Timestamp>,
    pid: OnceLock<u32>,
    finished: OnceLock<(JobOutcome, Timestamp)>,
}

impl JobRecord {
    fn new(token: JobToken, workspace: PathBuf) -> Self {
        let (state, _) = watch::channel(JobState::Pending);
        Self {
            token,
            workspace,
            submitted_at: Utc::now(),
            state,
            started_at: OnceLock::new(),
            pid: OnceLock::new(),
            finished: OnceLock::new(),
        }
    }

    pub fn token(&self) -> &JobToken {
        &self.token
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.finished.get().map(|(outcome, _)| outcome)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished.get().map(|(_, at)| *at)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    pub(crate) fn mark_running(&self) {
        let _ = self.started_at.set(Utc::now());
        self.advance(JobState::Running);
    }

    pub(crate) fn record_pid(&self, pid: Option<u32>) {
        if let Some(pid) = pid {
            let _ = self.pid.set(pid);
        }
    }

    /// Store the outcome, then publish its terminal state. A second call is
    /// ignored with a warning.
    pub(crate) fn finish(&self, outcome: JobOutcome) {
        let state = outcome.state;
        if self.finished.set((outcome, Utc::now())).is_err() {
            tracing::warn!(job_token = %self.token, "Job outcome already recorded, ignoring");
            return;
        }
        self.advance(state);
    }

    fn advance(&self, next: JobState) {
        let mut from = None;
        let applied = self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                from = Some(*current);
                false
            }
        });
        if !applied {
            tracing::warn!(
                job_token = %self.token,
                from = ?from,
                to = %next,
                "Illegal job state transition ignored",
            );
        }
    }

    /// Snapshot for callers. The pid is only ever exposed masked.
    pub fn summary(&self, pid_mask: &MaskKey, bad_input_exit_code: i32) -> JobSummary {
        let finished = self.finished.get();
        let outcome = finished.map(|(outcome, _)| outcome.clone());
        JobSummary {
            token: self.token.clone(),
            state: self.state(),
            masked_pid: self.pid().map(|pid| pid_mask.mask(i64::from(pid))),
            submitted_at: self.submitted_at,
            started_at: self.started_at.get().copied(),
            finished_at: finished.map(|(_, at)| *at),
            input_error: outcome
                .as_ref()
                .and_then(|o| o.input_error(bad_input_exit_code)),
            outcome,
            progress: None,
        }
    }
}

/// Token-keyed map of all jobs submitted to this process.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobToken, Arc<JobRecord>>>,
    pid_mask: MaskKey,
    bad_input_exit_code: i32,
}

impl JobRegistry {
    pub fn new(pid_mask: MaskKey, bad_input_exit_code: i32) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            pid_mask,
            bad_input_exit_code,
        }
    }

    pub(crate) fn insert(
        &self,
        token: JobToken,
        workspace: PathBuf,
    ) -> Result<Arc<JobRecord>, DispatchError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&token) {
            return Err(DispatchError::DuplicateJob(token));
        }
        let record = Arc::new(JobRecord::new(token.clone(), workspace));
        jobs.insert(token, Arc::clone(&record));
        Ok(record)
    }

    pub fn get(&self, token: &JobToken) -> Result<Arc<JobRecord>, DispatchError> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(token)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownJob(token.clone()))
    }

    pub fn summary(&self, record: &JobRecord) -> JobSummary {
        record.summary(&self.pid_mask, self.bad_input_exit_code)
    }

    /// Drop every job that finished before `cutoff` and return their
    /// tokens. Pending and running jobs are never evicted.
    pub fn evict_finished_before(&self, cutoff: Timestamp) -> Vec<JobToken> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<JobToken> = jobs
            .values()
            .filter(|record| record.finished_at().is_some_and(|at| at < cutoff))
            .map(|record| record.token.clone())
            .collect();
        for token in &expired {
            jobs.remove(token);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
