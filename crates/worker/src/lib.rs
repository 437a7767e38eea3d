//! Bounded job execution for the triPOD pipeline.
//!
//! [`WorkerPool`] runs argument vectors as child processes with
//! backpressure; [`StatusTracker`] answers status queries. Both share one
//! [`JobRegistry`] whose records hold each job's write-once outcome.

pub mod error;
pub mod job;
pub mod pool;
pub mod registry;
pub mod tracker;

pub use error::DispatchError;
pub use job::{JobOutcome, JobState, JobSummary};
pub use pool::{Admission, JobHandle, WorkerPool};
pub use registry::JobRegistry;
pub use tracker::{AwaitOutcome, StatusTracker};
