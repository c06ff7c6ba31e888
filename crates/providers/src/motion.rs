//! Adapter for MotionFrame, the text/image-to-video service.
//!
//! MotionFrame generates short clips from a text prompt, optionally
//! seeded with a first-frame image — which is exactly what segment
//! chaining needs: each clip starts from the previous clip's last frame.
//! The service enforces a strict per-clip duration cap and reports rate
//! limiting in-band via a status block on an otherwise-200 response,
//! together with a `prepared_image` URL that lets the resubmission skip
//! the provider-side frame preparation it already did.

use std::time::Duration;

use async_trait::async_trait;
use clipchain_core::job::{PollResult, PollStatus, ProviderId};
use clipchain_core::request::GenerationRequest;
use clipchain_core::strategy::GenerationStrategy;
use serde::Deserialize;

use crate::adapter::{ClipSpec, PollError, ProviderAdapter, SubmitError, SubmitOutcome};

/// Settings key holding the API key. Its presence enables the adapter.
pub const SETTING_API_KEY: &str = "CLIPCHAIN_MOTION_FRAME_API_KEY";
/// Settings key overriding the API base URL.
pub const SETTING_API_URL: &str = "CLIPCHAIN_MOTION_FRAME_API_URL";
/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://api.motionframe.ai";

/// Hard per-clip duration cap enforced by the service.
pub const MAX_CLIP_SECS: u32 = 10;

/// In-band status code meaning the request was accepted for queueing.
const CODE_OK: i64 = 0;
/// In-band status code meaning the account is rate limited.
const CODE_RATE_LIMITED: i64 = 1002;

/// Fallback wait when a rate-limit response omits `retry_after`.
const DEFAULT_RETRY_AFTER_SECS: u32 = 30;

/// HTTP client for the MotionFrame API.
pub struct MotionFrameAdapter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl MotionFrameAdapter {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Status block present on every MotionFrame response body.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BaseResp {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SubmitResponse {
    base: BaseResp,
    task_id: Option<String>,
    /// Seconds to wait before resubmitting, on a rate-limit response.
    retry_after: Option<u32>,
    /// Continuation seed: the frame the service already prepared for
    /// this request. Reusing it on resubmission skips that setup.
    prepared_image: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct QueryResponse {
    base: BaseResp,
    status: String,
    video_url: Option<String>,
    last_frame_url: Option<String>,
    error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Response interpretation (pure, unit-tested)
// ---------------------------------------------------------------------------

/// Interpret a 2xx submission body: accepted, rate limited, or rejected.
fn interpret_submit(parsed: SubmitResponse) -> Result<SubmitOutcome, SubmitError> {
    match parsed.base.code {
        CODE_OK => match parsed.task_id {
            Some(task_id) => Ok(SubmitOutcome::Accepted { job_id: task_id }),
            None => Err(SubmitError::Payload(
                "accepted response without a task_id".to_string(),
            )),
        },
        CODE_RATE_LIMITED => Ok(SubmitOutcome::RateLimited {
            retry_after_secs: parsed.retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            continuation_seed_url: parsed.prepared_image,
        }),
        code => Err(SubmitError::Rejected {
            status: 200,
            message: format!("provider code {code}: {}", parsed.base.message),
        }),
    }
}

/// Map MotionFrame's string vocabulary onto the normalized status set.
/// Total: unknown values map to `Processing`.
fn map_status(raw: &str) -> PollStatus {
    match raw {
        "success" => PollStatus::Completed,
        "fail" => PollStatus::Failed,
        "queueing" | "processing" => PollStatus::Processing,
        _ => PollStatus::Processing,
    }
}

fn interpret_query(parsed: QueryResponse) -> PollResult {
    match map_status(&parsed.status) {
        PollStatus::Completed => match parsed.video_url {
            Some(url) => PollResult::completed(url, parsed.last_frame_url),
            None => PollResult::processing(),
        },
        PollStatus::Failed => PollResult::failed(
            parsed
                .error_message
                .unwrap_or_else(|| format!("provider reported status '{}'", parsed.status)),
        ),
        PollStatus::Processing => PollResult::processing(),
    }
}

// ---------------------------------------------------------------------------
// Adapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for MotionFrameAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::MotionFrame
    }

    fn max_clip_secs(&self) -> Option<u32> {
        Some(MAX_CLIP_SECS)
    }

    fn poll_interval(&self) -> Duration {
        // Clips are short; the queue moves faster than avatar renders.
        Duration::from_secs(3)
    }

    async fn submit(
        &self,
        _strategy: &GenerationStrategy,
        request: &GenerationRequest,
        clip: &ClipSpec,
    ) -> Result<SubmitOutcome, SubmitError> {
        // MotionFrame is prompt-driven; the strategy's avatar/template
        // data does not apply here.
        let mut body = serde_json::json!({
            "model": "motion-01",
            "prompt": clip.text,
            "aspect_ratio": request.aspect_ratio.as_ratio_str(),
        });
        if let Some(seed) = &clip.seed_image_url {
            body["first_frame_image"] = serde_json::Value::String(seed.clone());
        }

        let response = self
            .client
            .post(format!("{}/v1/video_generation", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::Payload(format!("submit response: {e}")))?;

        let outcome = interpret_submit(parsed)?;
        match &outcome {
            SubmitOutcome::Accepted { job_id } => {
                tracing::info!(provider = %self.id(), task_id = %job_id, "Submission accepted");
            }
            SubmitOutcome::RateLimited {
                retry_after_secs, ..
            } => {
                tracing::warn!(
                    provider = %self.id(),
                    retry_after_secs,
                    "Submission rate limited",
                );
            }
        }
        Ok(outcome)
    }

    async fn poll(&self, job_id: &str) -> Result<PollResult, PollError> {
        let response = self
            .client
            .get(format!("{}/v1/query/video_generation", self.api_url))
            .query(&[("task_id", job_id)])
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Payload(format!(
                "query endpoint returned {status}"
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| PollError::Payload(format!("query response: {e}")))?;

        if parsed.base.code != CODE_OK {
            // A non-ok status block on a poll is transient noise, not a
            // verdict about the job itself.
            return Err(PollError::Payload(format!(
                "provider code {}: {}",
                parsed.base.code, parsed.base.message
            )));
        }

        Ok(interpret_query(parsed))
    }
}
