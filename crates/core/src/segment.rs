//! Sentence-level segment splitting for duration-capped providers.
//!
//! Providers with a strict maximum clip duration cannot render a long
//! dialogue in one request. [`split_into_segments`] greedily groups
//! sentences into bounded segments; the orchestrator then chains one
//! generation per segment, seeding each from the previous clip's last
//! frame. The split is pure and idempotent, so a restarted process can
//! re-derive the exact same segment list from the persisted request.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::estimate::estimate_spoken_secs;

/// One bounded portion of a dialogue, in chaining order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueSegment {
    pub id: Uuid,
    pub text: String,
    /// Sum of the per-sentence spoken-duration estimates in this segment.
    pub estimated_secs: u32,
}

/// Split `text` into ordered segments whose estimated duration does not
/// exceed `max_segment_secs`.
///
/// Sentences are delimited by `.`, `!`, and `?`. Sentences accumulate
/// into the current segment while the running estimate stays within the
/// cap; the sentence that would exceed it starts a new segment. A single
/// sentence longer than the cap still gets its own (over-budget) segment
/// — content is never dropped. Non-empty input always yields at least
/// one segment.
pub fn split_into_segments(text: &str, max_segment_secs: u32) -> Vec<DialogueSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_secs = 0u32;

    for sentence in split_sentences(text) {
        let secs = estimate_spoken_secs(&sentence);
        if !current.is_empty() && current_secs + secs > max_segment_secs {
            segments.push(close_segment(std::mem::take(&mut current), current_secs));
            current_secs = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
        current_secs += secs;
    }

    if !current.is_empty() {
        segments.push(close_segment(current, current_secs));
    }
    segments
}

/// Tokenize into sentences, keeping the trailing delimiter on each.
/// Whitespace around sentences is trimmed; a trailing fragment without a
/// delimiter still counts as a sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            push_trimmed(&mut sentences, &mut current);
        }
    }
    push_trimmed(&mut sentences, &mut current);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

fn close_segment(text: String, estimated_secs: u32) -> DialogueSegment {
    DialogueSegment {
        id: Uuid::new_v4(),
        text,
        estimated_secs,
    }
}
