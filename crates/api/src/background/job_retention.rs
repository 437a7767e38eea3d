//! Periodic eviction of finished jobs.
//!
//! Finished jobs stay queryable for `TRIPOD_JOB_RETENTION_SECS` after they
//! finish. This task drops older ones from the registry and the submitted
//! parameters map so neither grows without bound.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Longest pause between two eviction passes.
const MAX_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the eviction loop until `cancel` is triggered.
pub async fn run(state: AppState, cancel: CancellationToken) {
    let retention = state.pipeline.job_retention;
    let every = retention.clamp(Duration::from_secs(1), MAX_CLEANUP_INTERVAL);

    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = every.as_secs(),
        "Job retention task started",
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = state.evict_expired_jobs(Utc::now());
                if evicted > 0 {
                    tracing::info!(evicted, "Job retention: dropped finished jobs");
                } else {
                    tracing::debug!("Job retention: nothing to drop");
                }
            }
        }
    }
}
