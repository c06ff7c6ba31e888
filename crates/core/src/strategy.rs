//! Generation strategy variants and selection policy.
//!
//! A strategy is the mechanism used to request a video: a provider-side
//! template with variable bindings, or one/two configured avatars
//! speaking the dialogue directly. Selection runs once per submission
//! attempt; the orchestrator re-runs it with `exclude_template = true`
//! only for the one-shot fallback after a template-specific rejection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::request::GenerationRequest;

/// One speaker slot in an avatar-based strategy, fully resolved to
/// provider identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerRole {
    pub speaker_id: String,
    pub avatar_id: String,
    pub voice_id: String,
}

/// The mechanism used to request a video from a provider. Exactly one
/// variant is active per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationStrategy {
    /// Provider-side template filled with per-line variable bindings.
    Template {
        template_id: String,
        variables: BTreeMap<String, String>,
    },
    /// Two configured avatars in conversation.
    AvatarPair {
        speaker_a: SpeakerRole,
        speaker_b: SpeakerRole,
    },
    /// A single configured avatar reading the whole dialogue.
    AvatarSolo { speaker: SpeakerRole },
}

impl GenerationStrategy {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Template { .. } => "template",
            Self::AvatarPair { .. } => "avatar_pair",
            Self::AvatarSolo { .. } => "avatar_solo",
        }
    }
}

/// Resolve a concrete strategy for `request`.
///
/// Policy, in order:
/// 1. The named template, when present in `available_templates` and not
///    excluded by the fallback path.
/// 2. `AvatarSolo` when exactly one speaker has a full avatar/voice
///    profile.
/// 3. `AvatarPair` when exactly two do (pair order follows first
///    appearance in the dialogue).
///
/// Anything else is a configuration error: nothing to generate with.
pub fn resolve_strategy(
    request: &GenerationRequest,
    available_templates: &[String],
    exclude_template: bool,
) -> Result<GenerationStrategy, CoreError> {
    if !exclude_template {
        if let Some(template_id) = &request.template_id {
            if available_templates.contains(template_id) {
                return Ok(GenerationStrategy::Template {
                    template_id: template_id.clone(),
                    variables: template_variables(request),
                });
            }
        }
    }

    let configured = request.configured_speakers();
    match configured.as_slice() {
        [solo] => Ok(GenerationStrategy::AvatarSolo {
            speaker: speaker_role(request, solo)?,
        }),
        [a, b] => Ok(GenerationStrategy::AvatarPair {
            speaker_a: speaker_role(request, a)?,
            speaker_b: speaker_role(request, b)?,
        }),
        [] => Err(CoreError::Configuration(
            "no template available and no speaker has both an avatar and a voice configured"
                .to_string(),
        )),
        more => Err(CoreError::Configuration(format!(
            "avatar strategies support at most two speakers, {} are configured",
            more.len()
        ))),
    }
}

/// Bind each dialogue line to a `line_N` template variable, 1-based.
fn template_variables(request: &GenerationRequest) -> BTreeMap<String, String> {
    request
        .dialogue
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.text.trim().is_empty())
        .map(|(i, line)| (format!("line_{}", i + 1), line.text.trim().to_string()))
        .collect()
}

fn speaker_role(request: &GenerationRequest, speaker_id: &str) -> Result<SpeakerRole, CoreError> {
    let profile = request.speakers.get(speaker_id).ok_or_else(|| {
        CoreError::Configuration(format!("no profile for speaker '{speaker_id}'"))
    })?;
    // `configured_speakers` only returns ids with both fields set, so the
    // clones below cannot observe `None`; guard anyway for direct callers.
    match (&profile.avatar_id, &profile.voice_id) {
        (Some(avatar_id), Some(voice_id)) => Ok(SpeakerRole {
            speaker_id: speaker_id.to_string(),
            avatar_id: avatar_id.clone(),
            voice_id: voice_id.clone(),
        }),
        _ => Err(CoreError::Configuration(format!(
            "speaker '{speaker_id}' is missing an avatar or voice id"
        ))),
    }
}
