//! Adapter for ReplicaForge, the replica/clone-video service.
//!
//! ReplicaForge renders a single cloned presenter reading a script. Its
//! status vocabulary is numeric, and older API revisions omit the ready
//! code entirely and signal success only by the presence of
//! `download_url` — the mapping here accepts both. Templates and
//! two-speaker conversations are not supported.

use async_trait::async_trait;
use clipchain_core::job::{PollResult, PollStatus, ProviderId};
use clipchain_core::request::GenerationRequest;
use clipchain_core::strategy::GenerationStrategy;
use serde::Deserialize;

use crate::adapter::{ClipSpec, PollError, ProviderAdapter, SubmitError, SubmitOutcome};

/// Settings key holding the API key. Its presence enables the adapter.
pub const SETTING_API_KEY: &str = "CLIPCHAIN_REPLICA_FORGE_API_KEY";
/// Settings key overriding the API base URL.
pub const SETTING_API_URL: &str = "CLIPCHAIN_REPLICA_FORGE_API_URL";
/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://api.replicaforge.dev";

// Status codes from the ReplicaForge video object.
const STATUS_QUEUED: i64 = 0;
const STATUS_GENERATING: i64 = 1;
const STATUS_READY: i64 = 2;
const STATUS_ERROR: i64 = 3;

/// HTTP client for the ReplicaForge API.
pub struct ReplicaForgeAdapter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ReplicaForgeAdapter {
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

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    video_id: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct VideoObject {
    status_code: Option<i64>,
    download_url: Option<String>,
    still_url: Option<String>,
    error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Status mapping (total, unit-tested)
// ---------------------------------------------------------------------------

/// Map a ReplicaForge video object onto the normalized status set.
///
/// Total over all inputs: a missing or unknown status code with a
/// `download_url` present counts as completed (success by field
/// presence); anything else unknown keeps processing.
fn map_video_object(video: &VideoObject) -> PollResult {
    match video.status_code {
        Some(STATUS_READY) => match &video.download_url {
            Some(url) => PollResult::completed(url.clone(), video.still_url.clone()),
            // Ready without a URL yet: the file is still materializing.
            None => PollResult::processing(),
        },
        Some(STATUS_ERROR) => PollResult::failed(
            video
                .error_message
                .clone()
                .unwrap_or_else(|| "replica generation failed".to_string()),
        ),
        Some(STATUS_QUEUED) | Some(STATUS_GENERATING) => PollResult::processing(),
        _ => match &video.download_url {
            Some(url) => PollResult::completed(url.clone(), video.still_url.clone()),
            None => PollResult::processing(),
        },
    }
}

// ---------------------------------------------------------------------------
// Adapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for ReplicaForgeAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::ReplicaForge
    }

    async fn submit(
        &self,
        strategy: &GenerationStrategy,
        request: &GenerationRequest,
        clip: &ClipSpec,
    ) -> Result<SubmitOutcome, SubmitError> {
        let speaker = match strategy {
            GenerationStrategy::AvatarSolo { speaker } => speaker,
            GenerationStrategy::Template { .. } => {
                return Err(SubmitError::TemplateUnsupported(
                    "ReplicaForge has no template endpoint".to_string(),
                ));
            }
            GenerationStrategy::AvatarPair { .. } => {
                return Err(SubmitError::Rejected {
                    status: 400,
                    message: "ReplicaForge renders a single replica only".to_string(),
                });
            }
        };

        let body = serde_json::json!({
            "replica_id": speaker.avatar_id,
            "voice_id": speaker.voice_id,
            "script": clip.text,
            "aspect_ratio": request.aspect_ratio.as_ratio_str(),
            "captions": request.captions,
        });

        let response = self
            .client
            .post(format!("{}/v1/videos", self.api_url))
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

        tracing::info!(
            provider = %self.id(),
            video_id = %parsed.video_id,
            "Submission accepted",
        );

        Ok(SubmitOutcome::Accepted {
            job_id: parsed.video_id,
        })
    }

    async fn poll(&self, job_id: &str) -> Result<PollResult, PollError> {
        let response = self
            .client
            .get(format!("{}/v1/videos/{job_id}", self.api_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Payload(format!(
                "video endpoint returned {status}"
            )));
        }

        let video: VideoObject = response
            .json()
            .await
            .map_err(|e| PollError::Payload(format!("video response: {e}")))?;

        Ok(map_video_object(&video))
    }
}
