//! Offline comparison of two recordings.

use clap::Args;
use serde::Serialize;

use voicecheck_engine::embedding::l2_normalize;
use voicecheck_engine::similarity::{fallback_similarity, is_match, loudness};
use voicecheck_engine::{AudioFrame, Framer, SpeakerEmbedder, StatsEmbedder};

use super::{get_engine_config, output};
use crate::Cli;
use crate::audio::load_wav;

/// Compare a reference recording with a candidate.
///
/// Reports what the engine would score if the reference were the
/// enrollment window and the candidate a verification sample: the loudness
/// heuristic used without a backend, and the cosine similarity of the
/// built-in amplitude embedding.
#[derive(Args)]
pub struct SimilarityCommand {
    /// Reference recording (the enrolled speaker)
    reference: String,

    /// Candidate recording
    candidate: String,
}

#[derive(Debug, Serialize)]
struct SimilarityReport {
    reference_frames: usize,
    candidate_frames: usize,
    reference_loudness: f32,
    candidate_loudness: f32,
    fallback_score: f32,
    embedding_score: Option<f32>,
    threshold: f32,
    fallback_match: bool,
}

impl SimilarityCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = get_engine_config(cli)?;
        let reference = frames_of(&load_wav(&self.reference)?.samples, config.frame_size);
        let candidate = frames_of(&load_wav(&self.candidate)?.samples, config.frame_size);

        let report = compare(&reference, &candidate, config.match_threshold);
        output(cli)?.write(&report)
    }
}

fn frames_of(samples: &[f32], frame_size: usize) -> Vec<AudioFrame> {
    Framer::new(frame_size).push(samples)
}

fn compare(reference: &[AudioFrame], candidate: &[AudioFrame], threshold: f32) -> SimilarityReport {
    let fallback_score = fallback_similarity(candidate, reference);
    SimilarityReport {
        reference_frames: reference.len(),
        candidate_frames: candidate.len(),
        reference_loudness: loudness(reference),
        candidate_loudness: loudness(candidate),
        fallback_score,
        embedding_score: embedding_cosine(reference, candidate),
        threshold,
        fallback_match: is_match(&[fallback_score], threshold).unwrap_or(false),
    }
}

/// Cosine of the whole-recording embeddings; `None` when either side is
/// too short to embed.
fn embedding_cosine(reference: &[AudioFrame], candidate: &[AudioFrame]) -> Option<f32> {
    let embedder = StatsEmbedder::default();
    let embed = |frames: &[AudioFrame]| {
        let samples = voicecheck_engine::concat_samples(frames);
        let mut v = embedder.embed(&samples).ok()?;
        l2_normalize(&mut v);
        Some(v)
    };
    let a = embed(reference)?;
    let b = embed(candidate)?;
    Some(a.iter().zip(&b).map(|(x, y)| x * y).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    #[test]
    fn same_level_matches() {
        let a = frames_of(&tone(0.2, 160), 16);
        let b = frames_of(&tone(0.2, 320), 16);
        let report = compare(&a, &b, 0.7);
        assert_eq!(report.reference_frames, 10);
        assert_eq!(report.candidate_frames, 20);
        assert!((report.fallback_score - 1.0).abs() < 1e-5);
        assert!(report.fallback_match);
        let cos = report.embedding_score.unwrap();
        assert!((cos - 1.0).abs() < 1e-3);
    }

    #[test]
    fn quiet_candidate_fails() {
        let a = frames_of(&tone(0.5, 160), 16);
        let b = frames_of(&tone(0.01, 160), 16);
        let report = compare(&a, &b, 0.7);
        assert!((report.fallback_score - 0.02).abs() < 1e-4);
        assert!(!report.fallback_match);
    }

    #[test]
    fn empty_reference_is_unseeded() {
        let b = frames_of(&tone(0.3, 160), 16);
        let report = compare(&[], &b, 0.7);
        assert_eq!(report.fallback_score, 0.85);
        assert!(report.fallback_match);
        assert!(report.embedding_score.is_none());
    }
}
