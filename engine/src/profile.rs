//! Enrollment windows, verification samples and voice profiles.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::frame::{AudioFrame, concat_samples};

/// Frames collected during enrollment, bounded by wall-clock time.
#[derive(Debug, Clone)]
pub struct EnrollmentWindow {
    started_at: Instant,
    closed_at: Option<Instant>,
    frames: Vec<AudioFrame>,
}

impl EnrollmentWindow {
    pub(crate) fn open(started_at: Instant) -> Self {
        Self {
            started_at,
            closed_at: None,
            frames: Vec::new(),
        }
    }

    pub(crate) fn append(&mut self, frame: AudioFrame) {
        debug_assert!(self.closed_at.is_none(), "append to a closed window");
        self.frames.push(frame);
    }

    pub(crate) fn close(&mut self, at: Instant) {
        self.closed_at = Some(at);
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Time between the window opening and the frame that closed it.
    pub fn duration(&self) -> Option<Duration> {
        self.closed_at.map(|c| c.duration_since(self.started_at))
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<AudioFrame> {
        self.frames
    }
}

/// About one second of audio collected for a single verification tick.
#[derive(Debug, Clone, Default)]
pub struct VerificationSample {
    frames: Vec<AudioFrame>,
}

impl VerificationSample {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// All samples back to back, as submitted to a backend verifier.
    pub fn concat(&self) -> Vec<f32> {
        concat_samples(&self.frames)
    }
}

/// Which kind of profile an enrollment produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Backend,
    Sample,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend => write!(f, "backend"),
            Self::Sample => write!(f, "sample"),
        }
    }
}

/// Identity record built from one enrollment. Never mutated.
#[derive(Debug, Clone)]
pub enum VoiceProfile {
    /// Exported by the biometric backend.
    Backend {
        profile_id: String,
        profile_data: Vec<u8>,
    },
    /// Raw reference audio kept for the fallback estimator.
    Sample { reference_frames: Vec<AudioFrame> },
}

impl VoiceProfile {
    /// Wraps backend profile data under a fresh id.
    pub fn backend(profile_data: Vec<u8>) -> Self {
        Self::Backend {
            profile_id: uuid::Uuid::new_v4().to_string(),
            profile_data,
        }
    }

    pub fn sample(reference_frames: Vec<AudioFrame>) -> Self {
        Self::Sample { reference_frames }
    }

    pub fn kind(&self) -> ProfileKind {
        match self {
            Self::Backend { .. } => ProfileKind::Backend,
            Self::Sample { .. } => ProfileKind::Sample,
        }
    }

    /// Reference frames, empty for backend profiles.
    pub fn reference_frames(&self) -> &[AudioFrame] {
        match self {
            Self::Backend { .. } => &[],
            Self::Sample { reference_frames } => reference_frames,
        }
    }
}

/// The session's profile cell: one writer, many readers.
///
/// Replacing a profile swaps the whole `Arc`, so readers always see either
/// the old or the new profile.
#[derive(Debug, Default)]
pub struct ProfileSlot {
    inner: RwLock<Option<Arc<VoiceProfile>>>,
}

impl ProfileSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the first profile. Returns false if one is already present.
    pub fn install(&self, profile: VoiceProfile) -> bool {
        let mut slot = self.inner.write();
        if slot.is_some() {
            return false;
        }
        *slot = Some(Arc::new(profile));
        true
    }

    /// Atomically replaces the current profile, returning the previous one.
    pub fn replace(&self, profile: VoiceProfile) -> Option<Arc<VoiceProfile>> {
        self.inner.write().replace(Arc::new(profile))
    }

    pub fn get(&self) -> Option<Arc<VoiceProfile>> {
        self.inner.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Drops the profile at session end.
    pub fn clear(&self) -> Option<Arc<VoiceProfile>> {
        self.inner.write().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(v: f32, seq: u64) -> AudioFrame {
        AudioFrame::new(vec![v; 4], seq)
    }

    #[test]
    fn profile_kinds() {
        let p = VoiceProfile::backend(vec![1, 2, 3]);
        assert_eq!(p.kind(), ProfileKind::Backend);
        assert!(p.reference_frames().is_empty());

        let p = VoiceProfile::sample(vec![frame(0.1, 0)]);
        assert_eq!(p.kind(), ProfileKind::Sample);
        assert_eq!(p.reference_frames().len(), 1);
    }

    #[test]
    fn backend_profiles_get_distinct_ids() {
        let a = VoiceProfile::backend(vec![]);
        let b = VoiceProfile::backend(vec![]);
        match (a, b) {
            (
                VoiceProfile::Backend { profile_id: x, .. },
                VoiceProfile::Backend { profile_id: y, .. },
            ) => assert_ne!(x, y),
            _ => unreachable!(),
        }
    }

    #[test]
    fn slot_installs_once() {
        let slot = ProfileSlot::new();
        assert!(!slot.is_set());
        assert!(slot.install(VoiceProfile::sample(vec![])));
        assert!(!slot.install(VoiceProfile::backend(vec![9])));
        assert_eq!(slot.get().unwrap().kind(), ProfileKind::Sample);
    }

    #[test]
    fn slot_replace_keeps_old_readers_valid() {
        let slot = ProfileSlot::new();
        slot.install(VoiceProfile::sample(vec![frame(0.2, 0)]));
        let reader = slot.get().unwrap();

        let old = slot.replace(VoiceProfile::backend(vec![1])).unwrap();
        assert_eq!(old.kind(), ProfileKind::Sample);
        assert_eq!(reader.kind(), ProfileKind::Sample);
        assert_eq!(slot.get().unwrap().kind(), ProfileKind::Backend);

        assert!(slot.clear().is_some());
        assert!(slot.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn window_duration_measures_open_to_close() {
        let start = Instant::now();
        let mut w = EnrollmentWindow::open(start);
        w.append(frame(0.1, 0));
        assert!(w.duration().is_none());
        w.close(start + Duration::from_millis(1500));
        assert!(w.is_closed());
        assert_eq!(w.duration(), Some(Duration::from_millis(1500)));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn sample_concat() {
        let s = VerificationSample::new(vec![frame(0.1, 0), frame(0.2, 1)]);
        assert_eq!(s.concat().len(), 8);
        assert_eq!(s.len(), 2);
    }
}
