//! Adapter for AvatarStudio, the avatar-video service.
//!
//! AvatarStudio renders talking-avatar videos either from a named
//! template with variable bindings or from explicit avatar/voice inputs.
//! Its status vocabulary is a string enum; template-specific rejections
//! come back as a 400 with a structured error code, which is what feeds
//! the orchestrator's one-shot avatar fallback. No per-clip duration
//! cap.

use async_trait::async_trait;
use clipchain_core::job::{PollResult, PollStatus, ProviderId};
use clipchain_core::request::GenerationRequest;
use clipchain_core::strategy::{GenerationStrategy, SpeakerRole};
use serde::Deserialize;

use crate::adapter::{ClipSpec, PollError, ProviderAdapter, SubmitError, SubmitOutcome};

/// Settings key holding the API key. Its presence enables the adapter.
pub const SETTING_API_KEY: &str = "CLIPCHAIN_AVATAR_STUDIO_API_KEY";
/// Settings key overriding the API base URL.
pub const SETTING_API_URL: &str = "CLIPCHAIN_AVATAR_STUDIO_API_URL";
/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://api.avatarstudio.io";

/// Error code AvatarStudio returns when a template cannot be applied to
/// the submitted payload.
const CODE_TEMPLATE_NOT_APPLICABLE: &str = "template_not_applicable";

/// HTTP client for the AvatarStudio API.
pub struct AvatarStudioAdapter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl AvatarStudioAdapter {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
        }
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling
    /// across adapters.
    pub fn with_client(client: reqwest::Client, api_url: String, api_key: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SubmitEnvelope {
    data: SubmitData,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    data: StatusData,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StatusData {
    status: String,
    video_url: Option<String>,
    thumbnail_url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Payload construction (pure, unit-tested)
// ---------------------------------------------------------------------------

/// Build the `POST /v2/templates/{id}/generate` body.
fn template_payload(
    variables: &std::collections::BTreeMap<String, String>,
    request: &GenerationRequest,
) -> serde_json::Value {
    serde_json::json!({
        "variables": variables,
        "dimension": request.aspect_ratio.as_ratio_str(),
        "caption": request.captions,
    })
}

/// Build the `POST /v2/videos` body for avatar strategies.
///
/// For a pair, each dialogue line becomes one video input voiced by the
/// matching speaker; lines from unconfigured speakers fall to speaker A.
/// For a solo, the whole clip text is a single input.
fn avatar_payload(
    strategy: &GenerationStrategy,
    request: &GenerationRequest,
    clip: &ClipSpec,
) -> serde_json::Value {
    let inputs: Vec<serde_json::Value> = match strategy {
        GenerationStrategy::AvatarPair {
            speaker_a,
            speaker_b,
        } => request
            .dialogue
            .iter()
            .filter(|line| !line.text.trim().is_empty())
            .map(|line| {
                let role = if line.speaker_id == speaker_b.speaker_id {
                    speaker_b
                } else {
                    speaker_a
                };
                video_input(role, line.text.trim())
            })
            .collect(),
        GenerationStrategy::AvatarSolo { speaker } => {
            vec![video_input(speaker, &clip.text)]
        }
        // Template payloads are built by `template_payload`.
        GenerationStrategy::Template { .. } => Vec::new(),
    };

    serde_json::json!({
        "video_inputs": inputs,
        "dimension": request.aspect_ratio.as_ratio_str(),
        "caption": request.captions,
    })
}

fn video_input(role: &SpeakerRole, text: &str) -> serde_json::Value {
    serde_json::json!({
        "character": { "type": "avatar", "avatar_id": role.avatar_id },
        "voice": { "type": "text", "voice_id": role.voice_id, "input_text": text },
    })
}

// ---------------------------------------------------------------------------
// Status mapping (total, unit-tested)
// ---------------------------------------------------------------------------

/// Map AvatarStudio's string vocabulary onto the normalized status set.
///
/// Total: unknown values map to `Processing` so a transient or newly
/// introduced status never fails a job prematurely.
fn map_status(raw: &str) -> PollStatus {
    match raw {
        "completed" => PollStatus::Completed,
        "failed" | "error" => PollStatus::Failed,
        "pending" | "waiting" | "processing" | "rendering" => PollStatus::Processing,
        _ => PollStatus::Processing,
    }
}

/// Classify a non-2xx submission response.
fn classify_rejection(status: u16, body: &str) -> SubmitError {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        if envelope.error.code == CODE_TEMPLATE_NOT_APPLICABLE {
            return SubmitError::TemplateUnsupported(envelope.error.message);
        }
        return SubmitError::Rejected {
            status,
            message: envelope.error.message,
        };
    }
    SubmitError::Rejected {
        status,
        message: body.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Adapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for AvatarStudioAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::AvatarStudio
    }

    async fn submit(
        &self,
        strategy: &GenerationStrategy,
        request: &GenerationRequest,
        clip: &ClipSpec,
    ) -> Result<SubmitOutcome, SubmitError> {
        let (url, body) = match strategy {
            GenerationStrategy::Template { template_id, variables } => (
                format!("{}/v2/templates/{template_id}/generate", self.api_url),
                template_payload(variables, request),
            ),
            _ => (
                format!("{}/v2/videos", self.api_url),
                avatar_payload(strategy, request, clip),
            ),
        };

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(classify_rejection(status.as_u16(), &body));
        }

        let envelope: SubmitEnvelope = response
            .json()
            .await
            .map_err(|e| SubmitError::Payload(format!("submit response: {e}")))?;

        tracing::info!(
            provider = %self.id(),
            video_id = %envelope.data.video_id,
            strategy = strategy.kind(),
            "Submission accepted",
        );

        Ok(SubmitOutcome::Accepted {
            job_id: envelope.data.video_id,
        })
    }

    async fn poll(&self, job_id: &str) -> Result<PollResult, PollError> {
        let response = self
            .client
            .get(format!("{}/v1/videos/{job_id}/status", self.api_url))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // A non-2xx status poll is a transient condition, not a job
            // verdict; the orchestrator retries on the next tick.
            return Err(PollError::Payload(format!(
                "status endpoint returned {status}"
            )));
        }

        let envelope: StatusEnvelope = response
            .json()
            .await
            .map_err(|e| PollError::Payload(format!("status response: {e}")))?;
        let data = envelope.data;

        Ok(match map_status(&data.status) {
            PollStatus::Completed => match data.video_url {
                Some(url) => PollResult::completed(url, data.thumbnail_url),
                // "completed" without a URL: keep polling until it shows up.
                None => PollResult::processing(),
            },
            PollStatus::Failed => PollResult::failed(
                data.error
                    .unwrap_or_else(|| format!("provider reported status '{}'", data.status)),
            ),
            PollStatus::Processing => PollResult::processing(),
        })
    }
}
