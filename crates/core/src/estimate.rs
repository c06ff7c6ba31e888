//! Spoken-duration estimation for dialogue text.
//!
//! Converts a text fragment into an estimated number of spoken seconds
//! using a fixed words-per-minute model. Used by the segment splitter to
//! bound clip lengths and by the orchestrator to decide whether a
//! dialogue needs chaining at all.

/// Fixed speaking rate used for all estimates.
pub const WORDS_PER_MINUTE: u32 = 150;

/// Floor applied to every estimate. Very short lines would otherwise
/// round to zero seconds.
pub const MIN_CLIP_SECS: u32 = 3;

/// Estimate how many seconds it takes to speak `text`.
///
/// Words are counted by whitespace splitting, converted at
/// [`WORDS_PER_MINUTE`], rounded up, and floored at [`MIN_CLIP_SECS`].
/// Monotonic: appending text never decreases the estimate.
pub fn estimate_spoken_secs(text: &str) -> u32 {
    let words = text.split_whitespace().count() as u32;
    let secs = (words * 60).div_ceil(WORDS_PER_MINUTE);
    secs.max(MIN_CLIP_SECS)
}
