//! Backend-free similarity heuristic and the match decision.
//!
//! The estimator compares only average loudness. It exists so that the
//! engine keeps running without a biometric backend; it is not a speaker
//! recognizer and leans toward reporting a match.

use crate::frame::AudioFrame;

/// Similarity returned when there is nothing to compare against.
pub const UNSEEDED_SIMILARITY: f32 = 0.85;

/// Mean over frames of each frame's mean absolute amplitude.
/// 0 for an empty set.
pub fn loudness(frames: &[AudioFrame]) -> f32 {
    if frames.is_empty() {
        return 0.0;
    }
    let sum: f64 = frames.iter().map(|f| f.mean_abs() as f64).sum();
    (sum / frames.len() as f64) as f32
}

/// Similarity of two loudness statistics, in `[0, 1]`.
pub fn loudness_similarity(sample: f32, reference: f32) -> f32 {
    let max_avg = sample.max(reference);
    if !(max_avg > 0.0) {
        return UNSEEDED_SIMILARITY;
    }
    let diff = (sample - reference).abs();
    (1.0 - diff / max_avg).clamp(0.0, 1.0)
}

/// Compares a verification sample with enrolled reference frames.
///
/// Without reference frames the result is [`UNSEEDED_SIMILARITY`], which
/// passes at the default threshold.
pub fn fallback_similarity(sample: &[AudioFrame], reference: &[AudioFrame]) -> f32 {
    if reference.is_empty() {
        return UNSEEDED_SIMILARITY;
    }
    loudness_similarity(loudness(sample), loudness(reference))
}

/// Highest score, or `None` for an empty list.
pub fn best_score(scores: &[f32]) -> Option<f32> {
    scores
        .iter()
        .copied()
        .filter(|s| !s.is_nan())
        .fold(None, |best, s| match best {
            Some(b) if b >= s => Some(b),
            _ => Some(s),
        })
}

/// Match decision: `max(scores) >= threshold`. `None` if there are no scores.
pub fn is_match(scores: &[f32], threshold: f32) -> Option<bool> {
    best_score(scores).map(|best| best >= threshold)
}
