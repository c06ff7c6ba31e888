//! Generation request types supplied by the embedding application.
//!
//! A [`GenerationRequest`] is the immutable input to one submission: the
//! finished dialogue plus rendering options and per-speaker avatar/voice
//! configuration. The orchestrator never mutates it; segment chaining
//! re-derives everything it needs from the request text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::ProviderId;

/// One line of dialogue attributed to a speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker_id: String,
    pub text: String,
}

/// Target frame shape for the generated video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    Landscape,
    Portrait,
    Square,
}

impl AspectRatio {
    /// Provider-friendly `width:height` string.
    pub fn as_ratio_str(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Square => "1:1",
        }
    }
}

/// Avatar and voice identifiers configured for one speaker.
///
/// Both must be present for the speaker to count as configured for
/// avatar-based strategies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerProfile {
    pub avatar_id: Option<String>,
    pub voice_id: Option<String>,
}

impl SpeakerProfile {
    /// True when both an avatar and a voice are set.
    pub fn is_configured(&self) -> bool {
        self.avatar_id.is_some() && self.voice_id.is_some()
    }
}

/// Immutable input for one generation submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Ordered dialogue lines. Must contain at least one non-empty line.
    pub dialogue: Vec<DialogueLine>,
    pub aspect_ratio: AspectRatio,
    /// Whether the provider should burn captions into the video.
    pub captions: bool,
    /// Per-speaker avatar/voice configuration, keyed by `speaker_id`.
    pub speakers: BTreeMap<String, SpeakerProfile>,
    /// Template to prefer, if the embedding application selected one.
    pub template_id: Option<String>,
    /// Pin the job to a specific provider (e.g. the text/image-to-video
    /// flow). When `None`, the registry picks by strategy.
    pub preferred_provider: Option<ProviderId>,
}

impl GenerationRequest {
    /// Enforce the request invariant: at least one non-empty dialogue line.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self
            .dialogue
            .iter()
            .all(|line| line.text.trim().is_empty())
        {
            return Err(CoreError::Validation(
                "dialogue must contain at least one non-empty line".to_string(),
            ));
        }
        Ok(())
    }

    /// All dialogue text joined into a single script, in line order.
    pub fn full_text(&self) -> String {
        self.dialogue
            .iter()
            .map(|line| line.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Speaker ids with a fully configured profile, in first-appearance
    /// order of the dialogue. Order matters for pair assignment.
    pub fn configured_speakers(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for line in &self.dialogue {
            if seen.contains(&line.speaker_id.as_str()) {
                continue;
            }
            if self
                .speakers
                .get(&line.speaker_id)
                .is_some_and(SpeakerProfile::is_configured)
            {
                seen.push(line.speaker_id.as_str());
            }
        }
        seen
    }
}
