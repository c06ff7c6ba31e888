//! The adapter contract every provider integration implements.

use std::time::Duration;

use async_trait::async_trait;
use clipchain_core::job::{PollResult, ProviderId};
use clipchain_core::request::GenerationRequest;
use clipchain_core::strategy::GenerationStrategy;

/// Default polling interval when the adapter does not override it.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The text and optional seed image for one submission.
///
/// For unchained jobs this is the full dialogue; for chained jobs it is
/// one segment, seeded with the previous clip's last frame.
#[derive(Debug, Clone)]
pub struct ClipSpec {
    pub text: String,
    pub seed_image_url: Option<String>,
}

impl ClipSpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            seed_image_url: None,
        }
    }

    pub fn with_seed(mut self, seed_image_url: Option<String>) -> Self {
        self.seed_image_url = seed_image_url;
        self
    }
}

/// Outcome of a submission call that reached the provider.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The provider accepted the job and issued a handle.
    Accepted { job_id: String },
    /// The provider rate-limited the submission. The orchestrator must
    /// wait `retry_after_secs` and resubmit, reusing
    /// `continuation_seed_url` so provider-side setup is not repeated.
    RateLimited {
        retry_after_secs: u32,
        continuation_seed_url: Option<String>,
    },
}

/// Submission failures.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The provider rejected this payload specifically because of the
    /// template strategy. Triggers the one-shot avatar fallback.
    #[error("Template not usable: {0}")]
    TemplateUnsupported(String),

    /// Any other provider-side rejection (4xx-equivalent). Terminal for
    /// the submission unless the fallback applies.
    #[error("Provider rejected submission ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The HTTP request itself failed (network, DNS, TLS).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a body we could not interpret.
    #[error("Unexpected provider response: {0}")]
    Payload(String),
}

/// Polling failures. All of these are transient by contract: the
/// orchestrator logs them and retries on the next tick; only a
/// provider-reported terminal status changes job state.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected provider response: {0}")]
    Payload(String),
}

/// One external media-generation provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider this adapter talks to.
    fn id(&self) -> ProviderId;

    /// Hard per-clip duration cap, when the provider has one. A capped
    /// provider makes the orchestrator split the dialogue and chain
    /// segment generations.
    fn max_clip_secs(&self) -> Option<u32> {
        None
    }

    /// Preferred polling interval for this provider.
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Submit one clip generation.
    async fn submit(
        &self,
        strategy: &GenerationStrategy,
        request: &GenerationRequest,
        clip: &ClipSpec,
    ) -> Result<SubmitOutcome, SubmitError>;

    /// Poll a previously submitted job.
    async fn poll(&self, job_id: &str) -> Result<PollResult, PollError>;
}
