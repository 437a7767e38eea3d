use tripod_core::identifiers::JobToken;

/// Errors raised by the worker pool and status tracker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown job: {0}")]
    UnknownJob(JobToken),

    #[error("Job already submitted: {0}")]
    DuplicateJob(JobToken),

    #[error("Worker pool is shut down")]
    PoolClosed,
}
