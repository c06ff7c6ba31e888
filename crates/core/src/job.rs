//! Job lifecycle types and the normalized polling contract.
//!
//! [`JobStatus`] is the closed state set every provider vocabulary is
//! mapped onto; the `state_machine` helpers define which transitions the
//! orchestrator may apply. [`VideoJob`] is the single unit of mutable
//! orchestration state — owned exclusively by the orchestrator, read by
//! everyone else through its published projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::strategy::GenerationStrategy;

/// Timestamp alias used across the workspace.
pub type Timestamp = DateTime<Utc>;

// ---------------------------------------------------------------------------
// Provider identity
// ---------------------------------------------------------------------------

/// Identifies which adapter issued and owns a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Avatar-video service (templates, avatar pairs and solos).
    AvatarStudio,
    /// Replica/clone-video service (single-speaker replicas).
    ReplicaForge,
    /// Text/image-to-video service with a strict per-clip duration cap.
    MotionFrame,
}

impl ProviderId {
    /// Stable string form used in settings keys and the persisted record.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AvatarStudio => "avatar_studio",
            Self::ReplicaForge => "replica_forge",
            Self::MotionFrame => "motion_frame",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avatar_studio" => Ok(Self::AvatarStudio),
            "replica_forge" => Ok(Self::ReplicaForge),
            "motion_frame" => Ok(Self::MotionFrame),
            other => Err(format!("unknown provider id '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Job status and state machine
// ---------------------------------------------------------------------------

/// Normalized job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No submission yet; the UI is still assembling the request.
    Draft,
    /// A submission call is in flight (or about to be retried).
    Submitting,
    /// The provider accepted the job and is generating.
    Processing,
    /// The provider rate-limited the submission; a resubmission is
    /// scheduled using the provider-supplied continuation state.
    RateLimited,
    /// Terminal: the provider produced a result.
    Completed,
    /// Terminal: configuration, rejection, or provider-reported failure.
    Failed,
}

impl JobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Transition rules for [`JobStatus`], applied by the orchestrator before
/// every status change.
pub mod state_machine {
    use super::JobStatus::{self, *};

    /// Returns the set of statuses reachable from `from`.
    ///
    /// `Submitting -> Submitting` covers the one-shot strategy fallback
    /// retry, and `Processing -> Submitting` covers segment chaining,
    /// where the next clip is submitted after the previous one finishes.
    pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
        match from {
            Draft => &[Submitting],
            Submitting => &[Submitting, Processing, RateLimited, Failed],
            RateLimited => &[Submitting, Failed],
            Processing => &[Submitting, Completed, Failed],
            // Terminal states: no transitions allowed.
            Completed | Failed => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a transition, returning an error message for invalid ones.
    pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {from:?} -> {to:?}"))
        }
    }
}

// ---------------------------------------------------------------------------
// VideoJob
// ---------------------------------------------------------------------------

/// The unit of orchestration state for one generation job.
///
/// At most one non-terminal `VideoJob` exists per orchestrator at a time;
/// a new submission abandons polling on the previous job first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    /// Provider-issued job handle. `None` until a submission is accepted.
    /// For chained jobs this is the handle of the segment currently in
    /// flight.
    pub id: Option<String>,
    pub status: JobStatus,
    pub provider_id: Option<ProviderId>,
    pub strategy: Option<GenerationStrategy>,
    /// Populated only when `Completed`.
    pub result_url: Option<String>,
    pub cover_url: Option<String>,
    /// Populated only when `RateLimited`.
    pub retry_after_secs: Option<u32>,
    pub continuation_seed_url: Option<String>,
    /// Populated only when `Failed`.
    pub error: Option<String>,
    /// Result URLs of already-finished segments of a chained job, in
    /// chaining order.
    pub segment_results: Vec<String>,
    pub created_at: Timestamp,
    pub last_polled_at: Option<Timestamp>,
}

impl VideoJob {
    /// Fresh job with nothing selected yet. Initial watch-channel value
    /// and the state after a reset.
    pub fn empty_draft() -> Self {
        Self {
            id: None,
            status: JobStatus::Draft,
            provider_id: None,
            strategy: None,
            result_url: None,
            cover_url: None,
            retry_after_secs: None,
            continuation_seed_url: None,
            error: None,
            segment_results: Vec::new(),
            created_at: Utc::now(),
            last_polled_at: None,
        }
    }

    /// Draft job bound to a resolved strategy and provider, ready for
    /// submission.
    pub fn draft(provider_id: ProviderId, strategy: GenerationStrategy) -> Self {
        Self {
            provider_id: Some(provider_id),
            strategy: Some(strategy),
            ..Self::empty_draft()
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized poll contract
// ---------------------------------------------------------------------------

/// Normalized status reported by a provider poll.
///
/// Every adapter maps its raw vocabulary onto this set totally, with
/// unknown values defaulting to `Processing` so a transient or newly
/// introduced provider status never fails a job prematurely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Processing,
    Completed,
    Failed,
}

/// Normalized provider poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub status: PollStatus,
    /// Final video URL; set only on `Completed`.
    pub result_url: Option<String>,
    /// Cover/last-frame URL; set on `Completed` when the provider supplies
    /// one. Used as the next segment's seed image when chaining.
    pub cover_url: Option<String>,
    /// Provider-reported failure reason; set only on `Failed`.
    pub error: Option<String>,
}

impl PollResult {
    /// Still generating.
    pub fn processing() -> Self {
        Self {
            status: PollStatus::Processing,
            result_url: None,
            cover_url: None,
            error: None,
        }
    }

    /// Generation finished with a result URL and optional cover frame.
    pub fn completed(result_url: impl Into<String>, cover_url: Option<String>) -> Self {
        Self {
            status: PollStatus::Completed,
            result_url: Some(result_url.into()),
            cover_url,
            error: None,
        }
    }

    /// The provider explicitly reported a generation failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: PollStatus::Failed,
            result_url: None,
            cover_url: None,
            error: Some(reason.into()),
        }
    }
}
