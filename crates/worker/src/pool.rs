//! Bounded worker pool for external program runs.
//!
//! Two semaphores shape the pool:
//!
//! - **admission** (`pool_size + queue_depth` permits) is acquired by
//!   [`WorkerPool::admit`] (or [`WorkerPool::submit`], which admits first).
//!   When every permit is held the caller waits, so a saturated pool
//!   applies backpressure instead of dropping or rejecting work. Callers
//!   that allocate resources per job admit before allocating, so a caller
//!   that gives up while waiting leaves nothing behind.
//! - **execution** (`pool_size` permits) caps concurrently running
//!   processes. Admitted jobs queue on it in `Pending`.
//!
//! Both permits are released only when the job's outcome has been stored.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tripod_core::command::ArgumentVector;
use tripod_core::config::PipelineConfig;
use tripod_core::identifiers::JobToken;
use tripod_core::process::{run_argv, PROGRESS_FILE};
use tripod_core::types::Timestamp;

use crate::error::DispatchError;
use crate::job::{JobOutcome, JobSummary};
use crate::registry::JobRegistry;
use crate::tracker::StatusTracker;

/// Handle returned by [`WorkerPool::submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub token: JobToken,
    /// Summary as of submission; its state is `Pending`.
    pub summary: JobSummary,
}

/// Bounded pool executing submitted argument vectors.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    registry: Arc<JobRegistry>,
    admission: Arc<Semaphore>,
    execution: Arc<Semaphore>,
    tasks: TaskTracker,
    pool_size: usize,
}

impl WorkerPool {
    /// Pool sized from the pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        let registry = JobRegistry::new(config.pid_mask, config.bad_input_exit_code);
        Self::with_registry(Arc::new(registry), config.pool_size, config.queue_depth)
    }

    /// `pool_size` concurrent runs, `queue_depth` further admitted jobs.
    /// A zero `pool_size` is raised to one.
    pub fn with_registry(registry: Arc<JobRegistry>, pool_size: usize, queue_depth: usize) -> Self {
        let pool_size = pool_size.max(1);
        tracing::info!(pool_size, queue_depth, "Worker pool started");
        Self {
            registry,
            admission: Arc::new(Semaphore::new(pool_size + queue_depth)),
            execution: Arc::new(Semaphore::new(pool_size)),
            tasks: TaskTracker::new(),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Status tracker reading this pool's jobs.
    pub fn tracker(&self) -> StatusTracker {
        StatusTracker::new(Arc::clone(&self.registry))
    }

    /// Wait for an admission slot.
    ///
    /// The returned [`Admission`] holds the slot until it is used to submit
    /// a job or dropped. Dropping it unused frees the slot again.
    pub async fn admit(&self) -> Result<Admission, DispatchError> {
        let permit = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::PoolClosed)?;
        Ok(Admission {
            pool: self.clone(),
            permit,
        })
    }

    /// Enqueue `argv` to run inside `workspace`.
    ///
    /// Waits for an admission slot when the pool is saturated. Returns as
    /// soon as the job is registered; the run itself happens in the
    /// background.
    pub async fn submit(
        &self,
        token: JobToken,
        argv: ArgumentVector,
        workspace: PathBuf,
    ) -> Result<JobHandle, DispatchError> {
        self.admit().await?.submit(token, argv, workspace)
    }

    /// Forget jobs that finished before `cutoff`; returns their tokens.
    pub fn evict_finished_before(&self, cutoff: Timestamp) -> Vec<JobToken> {
        let evicted = self.registry.evict_finished_before(cutoff);
        if !evicted.is_empty() {
            tracing::info!(evicted = evicted.len(), remaining = self.registry.len(), "Finished jobs evicted");
        }
        evicted
    }

    fn spawn_job(
        &self,
        admitted: OwnedSemaphorePermit,
        token: JobToken,
        argv: ArgumentVector,
        workspace: PathBuf,
    ) -> Result<JobHandle, DispatchError> {
        if self.admission.is_closed() {
            return Err(DispatchError::PoolClosed);
        }
        let record = self.registry.insert(token.clone(), workspace)?;
        let summary = self.registry.summary(&record);
        tracing::info!(job_token = %token, program = %argv.program(), "Job submitted");

        let execution = Arc::clone(&self.execution);
        self.tasks.spawn(async move {
            let _admitted = admitted;
            let _slot = execution.acquire_owned().await.ok();

            record.mark_running();
            tracing::info!(job_token = %record.token(), "Job started");

            let progress_log = record.workspace().join(PROGRESS_FILE);
            let output = run_argv(&argv, record.workspace(), Some(&progress_log), |pid| {
                record.record_pid(pid)
            })
            .await;
            let outcome = JobOutcome::from_output(output);

            if outcome.exit_code.is_none() {
                tracing::error!(
                    job_token = %record.token(),
                    stderr = %outcome.stderr,
                    "Job ended without an exit code",
                );
            }
            tracing::info!(
                job_token = %record.token(),
                state = %outcome.state,
                exit_code = ?outcome.exit_code,
                duration_secs = outcome.duration_secs,
                "Job finished",
            );
            record.finish(outcome);
        });

        Ok(JobHandle { token, summary })
    }

    /// Stop admitting jobs and wait for every admitted job to finish.
    ///
    /// Running processes are not killed; shutdown completes when they exit.
    pub async fn shutdown(&self) {
        self.admission.close();
        self.tasks.close();
        tracing::info!(in_flight = self.tasks.len(), "Worker pool draining");
        self.tasks.wait().await;
        tracing::info!("Worker pool stopped");
    }
}

/// A reserved admission slot. See [`WorkerPool::admit`].
#[derive(Debug)]
pub struct Admission {
    pool: WorkerPool,
    permit: OwnedSemaphorePermit,
}

impl Admission {
    /// Register the job and start it in the background. The slot moves to
    /// the job; on error it is released.
    pub fn submit(
        self,
        token: JobToken,
        argv: ArgumentVector,
        workspace: PathBuf,
    ) -> Result<JobHandle, DispatchError> {
        let Self { pool, permit } = self;
        pool.spawn_job(permit, token, argv, workspace)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
