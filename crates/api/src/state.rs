use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tripod_core::command::AnalysisParams;
use tripod_core::config::PipelineConfig;
use tripod_core::identifiers::JobToken;
use tripod_core::process::read_progress_tail;
use tripod_core::redact::PathRedactor;
use tripod_core::results::ResultAggregator;
use tripod_core::types::Timestamp;
use tripod_worker::{JobState, JobSummary, StatusTracker, WorkerPool};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything inside is behind `Arc` or is a handle.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Pipeline configuration (roots, program, pool limits).
    pub pipeline: Arc<PipelineConfig>,
    /// Bounded pool running the external program.
    pub pool: WorkerPool,
    /// Status lookups over the pool's jobs.
    pub tracker: StatusTracker,
    /// Result aggregator configured from the pipeline settings.
    pub aggregator: Arc<ResultAggregator>,
    /// Strips install and upload roots from program output shown to clients.
    pub redactor: Arc<PathRedactor>,
    /// Parameters each job was submitted with, for result reports.
    pub submissions: Arc<RwLock<HashMap<JobToken, AnalysisParams>>>,
}

impl AppState {
    pub fn new(config: ServerConfig, pipeline: PipelineConfig) -> Self {
        let pool = WorkerPool::new(&pipeline);
        let tracker = pool.tracker();
        let aggregator = ResultAggregator::new(&pipeline);
        let redactor = pipeline.path_redactor();
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            pool,
            tracker,
            aggregator: Arc::new(aggregator),
            redactor: Arc::new(redactor),
            submissions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn remember_params(&self, token: JobToken, params: AnalysisParams) {
        self.submissions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token, params);
    }

    pub fn params_for(&self, token: &JobToken) -> Option<AnalysisParams> {
        self.submissions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(token)
            .cloned()
    }

    /// Drop every finished job older than the configured retention, along
    /// with its submitted parameters. Returns the number of jobs dropped.
    ///
    /// Workspaces on disk are left alone.
    pub fn evict_expired_jobs(&self, now: Timestamp) -> usize {
        let Ok(retention) = chrono::Duration::from_std(self.pipeline.job_retention) else {
            return 0;
        };
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return 0;
        };

        let evicted = self.pool.evict_finished_before(cutoff);
        if !evicted.is_empty() {
            let mut submissions = self.submissions.write().unwrap_or_else(|e| e.into_inner());
            for token in &evicted {
                submissions.remove(token);
            }
        }
        evicted.len()
    }

    /// Prepare a job summary for a client: redact program output and attach
    /// the progress log tail while the job runs.
    pub async fn present(&self, mut summary: JobSummary) -> JobSummary {
        if summary.state == JobState::Running {
            let workspace = self.pipeline.workspace_dir(&summary.token);
            summary.progress = read_progress_tail(&workspace)
                .await
                .map(|tail| self.redactor.redact(&tail));
        }
        if let Some(outcome) = summary.outcome.as_mut() {
            outcome.stdout = self.redactor.redact(&outcome.stdout);
            outcome.stderr = self.redactor.redact(&outcome.stderr);
        }
        summary.input_error = summary.input_error.map(|e| self.redactor.redact(&e));
        summary
    }
}
