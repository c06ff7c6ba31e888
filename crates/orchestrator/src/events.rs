//! Discrete events emitted by the orchestrator.
//!
//! The watch channel always carries the latest [`VideoJob`] snapshot;
//! these events additionally mark the moments a progress display cares
//! about. Broadcast on a `tokio::sync::broadcast` channel; dropped
//! silently when nobody listens.
//!
//! [`VideoJob`]: clipchain_core::job::VideoJob

use clipchain_core::job::JobStatus;
use serde::Serialize;

/// A state change or notable moment in the active job's lifecycle.
#[derive(Debug, Clone, Serialize)]
pub enum JobEvent {
    /// The job moved to a new lifecycle status.
    StatusChanged { from: JobStatus, to: JobStatus },

    /// The provider rate-limited a submission; a resubmission is
    /// scheduled. Shown as "retrying", never as an error.
    RateLimitScheduled { retry_after_secs: u32, attempt: u32 },

    /// One segment of a chained job finished. Emitted only for jobs
    /// with more than one segment.
    SegmentCompleted {
        index: usize,
        total: usize,
        url: String,
    },

    /// The job has survived an unusually high number of consecutive
    /// polls without reaching a terminal state. Informational: polling
    /// continues, the job is never auto-failed.
    Stuck { polls: u32 },

    /// Terminal: the final video is ready.
    Completed { result_url: String },

    /// Terminal: the job failed with a user-facing reason.
    Failed { error: String },
}
