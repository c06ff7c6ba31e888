//! The persisted job record.
//!
//! A flat, serde-serialized snapshot of the active job plus the request
//! that produced it. The request travels with the job so a restarted
//! process can resubmit a rate-limited job and re-derive the segment
//! list of a chained job (the splitter is deterministic) without any
//! other state.

use chrono::{DateTime, Utc};
use clipchain_core::job::{JobStatus, ProviderId, VideoJob};
use clipchain_core::request::GenerationRequest;
use clipchain_core::strategy::GenerationStrategy;
use serde::{Deserialize, Serialize};

/// Snapshot of one job, written before every network call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedJob {
    /// Provider-issued handle of the clip currently in flight, if any.
    pub job_id: Option<String>,
    pub provider_id: Option<ProviderId>,
    pub status: JobStatus,
    pub strategy: Option<GenerationStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_seed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Completed segment result URLs of a chained job, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment_results: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// The originating request, kept for resubmission and re-splitting.
    pub request: GenerationRequest,
}

impl PersistedJob {
    /// Snapshot the current job state together with its request.
    pub fn snapshot(job: &VideoJob, request: &GenerationRequest) -> Self {
        Self {
            job_id: job.id.clone(),
            provider_id: job.provider_id,
            status: job.status,
            strategy: job.strategy.clone(),
            result_url: job.result_url.clone(),
            cover_url: job.cover_url.clone(),
            retry_after_secs: job.retry_after_secs,
            continuation_seed_url: job.continuation_seed_url.clone(),
            error: job.error.clone(),
            segment_results: job.segment_results.clone(),
            created_at: job.created_at,
            request: request.clone(),
        }
    }

    /// Rebuild the in-memory job and its request. `last_polled_at` is not
    /// persisted; it restarts at `None`.
    pub fn into_parts(self) -> (VideoJob, GenerationRequest) {
        let job = VideoJob {
            id: self.job_id,
            status: self.status,
            provider_id: self.provider_id,
            strategy: self.strategy,
            result_url: self.result_url,
            cover_url: self.cover_url,
            retry_after_secs: self.retry_after_secs,
            continuation_seed_url: self.continuation_seed_url,
            error: self.error,
            segment_results: self.segment_results,
            created_at: self.created_at,
            last_polled_at: None,
        };
        (job, self.request)
    }
}
