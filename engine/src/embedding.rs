//! Biometric backend built on a speaker-embedding model.
//!
//! Enrollment averages per-frame embeddings; the exported profile is the
//! L2-normalized mean, serialized as little-endian `f32`. Verification
//! embeds the whole sample and returns one cosine similarity per enrolled
//! profile.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::backend::{BiometricBackend, Profiler, Verifier};
use crate::error::BackendError;
use crate::frame::AudioFrame;

/// Frames needed before enrollment reports 100 %.
pub const DEFAULT_ENROLL_FRAMES: usize = 64;

/// Extracts speaker embedding vectors from mono `f32` audio.
///
/// Implementations must be safe for concurrent use.
pub trait SpeakerEmbedder: Send + Sync {
    /// Computes an embedding of [`dimension`](Self::dimension) values.
    fn embed(&self, samples: &[f32]) -> Result<Vec<f32>, BackendError>;

    fn dimension(&self) -> usize;
}

/// L2-normalizes a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        let scale = (1.0 / norm) as f32;
        v.iter_mut().for_each(|x| *x *= scale);
    }
}

/// Cosine similarity of two unit vectors.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn encode_profile(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_profile(data: &[u8], dimension: usize) -> Result<Vec<f32>, BackendError> {
    if data.len() != dimension * 4 {
        return Err(BackendError::InvalidProfile(format!(
            "expected {} bytes, got {}",
            dimension * 4,
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// [`BiometricBackend`] over a [`SpeakerEmbedder`].
pub struct EmbeddingBackend {
    embedder: Arc<dyn SpeakerEmbedder>,
    enroll_frames: usize,
}

impl EmbeddingBackend {
    pub fn new(embedder: Arc<dyn SpeakerEmbedder>) -> Self {
        Self {
            embedder,
            enroll_frames: DEFAULT_ENROLL_FRAMES,
        }
    }

    pub fn with_enroll_frames(mut self, frames: usize) -> Self {
        self.enroll_frames = frames.max(1);
        self
    }

    fn check_key(access_key: &str) -> Result<(), BackendError> {
        if access_key.trim().is_empty() {
            return Err(BackendError::InvalidKey);
        }
        Ok(())
    }
}

#[async_trait]
impl BiometricBackend for EmbeddingBackend {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn create_profiler(
        &self,
        access_key: &str,
        _model: Option<&str>,
    ) -> Result<Box<dyn Profiler>, BackendError> {
        Self::check_key(access_key)?;
        Ok(Box::new(EmbeddingProfiler {
            embedder: Some(self.embedder.clone()),
            sum: vec![0.0; self.embedder.dimension()],
            count: 0,
            target: self.enroll_frames,
        }))
    }

    async fn create_verifier(
        &self,
        access_key: &str,
        _model: Option<&str>,
        profiles: &[Vec<u8>],
    ) -> Result<Box<dyn Verifier>, BackendError> {
        Self::check_key(access_key)?;
        if profiles.is_empty() {
            return Err(BackendError::InvalidProfile("no profiles".into()));
        }
        let dim = self.embedder.dimension();
        let profiles = profiles
            .iter()
            .map(|p| decode_profile(p, dim))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(EmbeddingVerifier {
            embedder: Some(self.embedder.clone()),
            profiles,
        }))
    }
}

struct EmbeddingProfiler {
    embedder: Option<Arc<dyn SpeakerEmbedder>>,
    sum: Vec<f64>,
    count: usize,
    target: usize,
}

#[async_trait]
impl Profiler for EmbeddingProfiler {
    async fn enroll(&mut self, frame: &AudioFrame) -> Result<f32, BackendError> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| BackendError::Failed("profiler released".into()))?;
        let mut emb = embedder.embed(frame.samples())?;
        if emb.len() != self.sum.len() {
            return Err(BackendError::Failed(format!(
                "dimension mismatch: expected {}, got {}",
                self.sum.len(),
                emb.len()
            )));
        }
        l2_normalize(&mut emb);
        for (acc, v) in self.sum.iter_mut().zip(&emb) {
            *acc += *v as f64;
        }
        self.count += 1;
        Ok((self.count as f32 / self.target as f32 * 100.0).min(100.0))
    }

    async fn export(&mut self) -> Result<Vec<u8>, BackendError> {
        if self.count == 0 {
            return Err(BackendError::InvalidProfile("no audio enrolled".into()));
        }
        let n = self.count as f64;
        let mut mean: Vec<f32> = self.sum.iter().map(|s| (s / n) as f32).collect();
        l2_normalize(&mut mean);
        Ok(encode_profile(&mean))
    }

    fn release(&mut self) {
        if self.embedder.take().is_some() {
            debug!(frames = self.count, "embedding profiler released");
        }
    }
}

struct EmbeddingVerifier {
    embedder: Option<Arc<dyn SpeakerEmbedder>>,
    profiles: Vec<Vec<f32>>,
}

#[async_trait]
impl Verifier for EmbeddingVerifier {
    async fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, BackendError> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| BackendError::Failed("verifier released".into()))?;
        let mut emb = embedder.embed(samples)?;
        l2_normalize(&mut emb);
        Ok(self.profiles.iter().map(|p| dot(&emb, p)).collect())
    }

    fn release(&mut self) {
        self.embedder = None;
        self.profiles.clear();
    }
}

/// Cheap deterministic embedder over amplitude statistics.
///
/// Splits the input into `bands` equal blocks and reports each block's
/// RMS, zero-crossing rate and peak. Good enough to tell a whisper from a
/// shout; not a voice model.
#[derive(Debug, Clone)]
pub struct StatsEmbedder {
    bands: usize,
}

impl StatsEmbedder {
    pub fn new(bands: usize) -> Self {
        Self {
            bands: bands.max(1),
        }
    }
}

impl Default for StatsEmbedder {
    fn default() -> Self {
        Self::new(4)
    }
}

impl SpeakerEmbedder for StatsEmbedder {
    fn embed(&self, samples: &[f32]) -> Result<Vec<f32>, BackendError> {
        if samples.len() < self.bands {
            return Err(BackendError::Failed(format!(
                "audio too short: need at least {} samples, got {}",
                self.bands,
                samples.len()
            )));
        }
        let block = samples.len() / self.bands;
        let mut out = Vec::with_capacity(self.dimension());
        for chunk in samples.chunks(block).take(self.bands) {
            let rms = (chunk.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>()
                / chunk.len() as f64)
                .sqrt();
            let crossings = chunk
                .windows(2)
                .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
                .count();
            let zcr = crossings as f64 / chunk.len() as f64;
            let peak = chunk.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            out.extend([rms as f32, zcr as f32, peak]);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.bands * 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> EmbeddingBackend {
        EmbeddingBackend::new(Arc::new(StatsEmbedder::default())).with_enroll_frames(4)
    }

    fn tone(amp: f32, period: usize, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| if (i / period) % 2 == 0 { amp } else { -amp })
            .collect()
    }

    #[test]
    fn profile_bytes_roundtrip() {
        let v = vec![0.25, -1.0, 3.5];
        assert_eq!(decode_profile(&encode_profile(&v), 3).unwrap(), v);
        assert!(decode_profile(&[0u8; 5], 3).is_err());
    }

    #[test]
    fn l2_normalize_unit_and_zero() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        let mut z = vec![0.0, 0.0];
        l2_normalize(&mut z);
        assert_eq!(z, vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn blank_key_is_rejected() {
        assert!(matches!(
            backend().create_profiler("  ", None).await,
            Err(BackendError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn enroll_progress_and_export() {
        let b = backend();
        let mut p = b.create_profiler("key", None).await.unwrap();
        assert!(p.export().await.is_err());

        let frame = AudioFrame::new(tone(0.3, 8, 256), 0);
        assert_eq!(p.enroll(&frame).await.unwrap(), 25.0);
        for _ in 0..5 {
            p.enroll(&frame).await.unwrap();
        }
        assert_eq!(p.enroll(&frame).await.unwrap(), 100.0);
        let data = p.export().await.unwrap();
        assert_eq!(data.len(), 12 * 4);
        p.release();
        assert!(p.enroll(&frame).await.is_err());
    }

    #[tokio::test]
    async fn same_voice_scores_higher_than_different_voice() {
        let b = backend();
        let mut p = b.create_profiler("key", None).await.unwrap();
        let voice = tone(0.3, 8, 256);
        for seq in 0..4 {
            p.enroll(&AudioFrame::new(voice.clone(), seq)).await.unwrap();
        }
        let profile = p.export().await.unwrap();

        let mut v = b.create_verifier("key", None, &[profile]).await.unwrap();
        let same = v.process(&voice).await.unwrap();
        let other = v.process(&tone(0.05, 64, 256)).await.unwrap();
        assert_eq!(same.len(), 1);
        assert!(same[0] > 0.99);
        assert!(other[0] < same[0]);
    }

    #[tokio::test]
    async fn verifier_rejects_malformed_profiles() {
        let b = backend();
        assert!(matches!(
            b.create_verifier("key", None, &[vec![1, 2, 3]]).await,
            Err(BackendError::InvalidProfile(_))
        ));
        assert!(b.create_verifier("key", None, &[]).await.is_err());
    }
}
