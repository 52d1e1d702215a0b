//! Cross-pass fragment merging
//!
//! Two OCR passes over the same receipt report most words twice. Fragments
//! collapse into one only when their text is nearly identical AND they sit
//! at nearly the same spot, so a word printed twice on the receipt (two
//! "MILK" lines) survives as two items.

use crate::types::RecognizedFragment;

/// Fragments below this confidence never reach the result
pub const CONFIDENCE_THRESHOLD: f32 = 0.85;

/// Minimum text similarity (0-100) for two fragments to be the same word
pub const SIMILARITY_THRESHOLD: u32 = 90;

/// Maximum left/top offset, in pixels, for two fragments to be the same word
pub const POSITION_TOLERANCE: u32 = 5;

/// Merge pass A and pass B into one filtered, deduplicated list.
///
/// Candidates are visited pass A first, each in engine order. A candidate is
/// compared against everything accepted so far, including earlier fragments
/// from its own pass; the first-seen fragment wins.
pub fn merge_passes(
    pass_a: Vec<RecognizedFragment>,
    pass_b: Vec<RecognizedFragment>,
) -> Vec<RecognizedFragment> {
    let candidates = pass_a.len() + pass_b.len();
    let mut accepted: Vec<RecognizedFragment> = Vec::with_capacity(candidates);
    let mut low_confidence = 0usize;
    let mut duplicates = 0usize;

    for fragment in pass_a.into_iter().chain(pass_b) {
        if fragment.confidence < CONFIDENCE_THRESHOLD {
            low_confidence += 1;
            continue;
        }
        if accepted.iter().any(|kept| is_duplicate(kept, &fragment)) {
            duplicates += 1;
            continue;
        }
        accepted.push(fragment);
    }

    tracing::debug!(
        candidates,
        low_confidence,
        duplicates,
        accepted = accepted.len(),
        "merged OCR passes"
    );
    accepted
}

/// Same word reported twice: similar text at (almost) the same position
pub fn is_duplicate(a: &RecognizedFragment, b: &RecognizedFragment) -> bool {
    a.left.abs_diff(b.left) <= POSITION_TOLERANCE
        && a.top.abs_diff(b.top) <= POSITION_TOLERANCE
        && similarity_ratio(&a.text, &b.text) >= SIMILARITY_THRESHOLD
}

/// Case-insensitive Indel similarity on a 0-100 scale, rounded to the
/// nearest integer. 100 means identical.
///
/// Insertions and deletions each cost one edit and a substitution costs two,
/// so a glyph dropped by one pass (`BANANA` vs `BANANAS`) scores 92.
pub fn similarity_ratio(a: &str, b: &str) -> u32 {
    let similarity = rapidfuzz::fuzz::ratio(a.to_lowercase().chars(), b.to_lowercase().chars());
    (similarity * 100.0).round() as u32
}
