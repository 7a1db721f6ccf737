//! Enrollment and scoring strategies.
//!
//! The engine talks to one [`SpeakerMatcher`], chosen once when the session
//! activates: [`BiometricMatcher`] when a backend accepts the access key,
//! [`FallbackMatcher`] otherwise. Degraded paths live inside the matchers,
//! so the engine never checks whether a backend exists.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{BackendHandle, BiometricBackend, Profiler, Verifier};
use crate::error::VerifyError;
use crate::frame::AudioFrame;
use crate::profile::{EnrollmentWindow, VerificationSample, VoiceProfile};
use crate::similarity::fallback_similarity;

/// How a tick's scores were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMethod {
    Backend,
    Fallback,
}

/// Scores for one verification tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    pub values: Vec<f32>,
    pub method: ScoreMethod,
}

/// Strategy used by the enrollment controller and verification scheduler.
#[async_trait]
pub trait SpeakerMatcher: Send {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Offers one enrollment frame. Returns progress in percent when known.
    async fn observe_enrollment_frame(&mut self, frame: &AudioFrame) -> Option<f32>;

    /// Turns a closed window into a profile. Never fails; degraded paths
    /// produce a sample profile.
    async fn build_profile(&mut self, window: EnrollmentWindow) -> VoiceProfile;

    /// Called once after the profile is installed.
    async fn prepare_verification(&mut self, profile: &VoiceProfile);

    /// Scores one sample against the profile.
    async fn score(
        &mut self,
        profile: &VoiceProfile,
        sample: &VerificationSample,
    ) -> Result<Scores, VerifyError>;

    /// Frees every backend resource. Safe to call more than once.
    fn release(&mut self);
}

/// Amplitude heuristic; always available.
#[derive(Debug, Default)]
pub struct FallbackMatcher;

impl FallbackMatcher {
    pub fn new() -> Self {
        Self
    }

    fn score_sample(
        profile: &VoiceProfile,
        sample: &VerificationSample,
    ) -> Result<Scores, VerifyError> {
        match profile {
            VoiceProfile::Sample { reference_frames } => Ok(Scores {
                values: vec![fallback_similarity(sample.frames(), reference_frames)],
                method: ScoreMethod::Fallback,
            }),
            VoiceProfile::Backend { .. } => Err(VerifyError::ScoringIndeterminate(
                "backend profile holds no reference audio".into(),
            )),
        }
    }
}

#[async_trait]
impl SpeakerMatcher for FallbackMatcher {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn observe_enrollment_frame(&mut self, _frame: &AudioFrame) -> Option<f32> {
        None
    }

    async fn build_profile(&mut self, window: EnrollmentWindow) -> VoiceProfile {
        VoiceProfile::sample(window.into_frames())
    }

    async fn prepare_verification(&mut self, _profile: &VoiceProfile) {}

    async fn score(
        &mut self,
        profile: &VoiceProfile,
        sample: &VerificationSample,
    ) -> Result<Scores, VerifyError> {
        Self::score_sample(profile, sample)
    }

    fn release(&mut self) {}
}

/// Strategy backed by a [`BiometricBackend`].
pub struct BiometricMatcher {
    backend: Arc<dyn BiometricBackend>,
    access_key: String,
    model: Option<String>,
    profiler: BackendHandle<dyn Profiler>,
    verifier: BackendHandle<dyn Verifier>,
}

impl BiometricMatcher {
    /// Creates the profiler. Fails with [`VerifyError::BackendUnavailable`]
    /// if the backend rejects the key or cannot start.
    pub async fn start(
        backend: Arc<dyn BiometricBackend>,
        access_key: &str,
        model: Option<&str>,
    ) -> Result<Self, VerifyError> {
        let profiler = backend
            .create_profiler(access_key, model)
            .await
            .map_err(|e| VerifyError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            backend,
            access_key: access_key.to_string(),
            model: model.map(str::to_string),
            profiler: BackendHandle::new(profiler),
            verifier: BackendHandle::empty(),
        })
    }

    pub fn has_profiler(&self) -> bool {
        self.profiler.is_live()
    }

    pub fn has_verifier(&self) -> bool {
        self.verifier.is_live()
    }
}

#[async_trait]
impl SpeakerMatcher for BiometricMatcher {
    fn name(&self) -> &'static str {
        "biometric"
    }

    async fn observe_enrollment_frame(&mut self, frame: &AudioFrame) -> Option<f32> {
        let profiler = self.profiler.get_mut()?;
        match profiler.enroll(frame).await {
            Ok(progress) => Some(progress),
            Err(e) => {
                debug!(seq = frame.sequence(), "profiler enroll failed: {}", e);
                None
            }
        }
    }

    async fn build_profile(&mut self, window: EnrollmentWindow) -> VoiceProfile {
        let exported = match self.profiler.get_mut() {
            Some(profiler) => profiler.export().await.map_err(|e| e.into_call_failure("export")),
            None => Err(VerifyError::BackendUnavailable("profiler already released".into())),
        };
        self.profiler.release();

        match exported {
            Ok(data) => VoiceProfile::backend(data),
            Err(e) => {
                warn!("falling back to sample profile: {}", e);
                VoiceProfile::sample(window.into_frames())
            }
        }
    }

    async fn prepare_verification(&mut self, profile: &VoiceProfile) {
        let VoiceProfile::Backend { profile_data, .. } = profile else {
            return;
        };
        let profiles = [profile_data.clone()];
        match self
            .backend
            .create_verifier(&self.access_key, self.model.as_deref(), &profiles)
            .await
        {
            Ok(v) => {
                info!(backend = self.backend.name(), "verifier ready");
                self.verifier = BackendHandle::new(v);
            }
            Err(e) => warn!("verifier unavailable, ticks will be skipped: {}", e),
        }
    }

    async fn score(
        &mut self,
        profile: &VoiceProfile,
        sample: &VerificationSample,
    ) -> Result<Scores, VerifyError> {
        if let VoiceProfile::Sample { .. } = profile {
            return FallbackMatcher::score_sample(profile, sample);
        }
        let verifier = self.verifier.get_mut().ok_or_else(|| {
            VerifyError::ScoringIndeterminate("backend profile without a verifier".into())
        })?;
        let values = verifier
            .process(&sample.concat())
            .await
            .map_err(|e| e.into_call_failure("process"))?;
        if values.is_empty() {
            return Err(VerifyError::ScoringIndeterminate(
                "verifier returned no scores".into(),
            ));
        }
        Ok(Scores {
            values,
            method: ScoreMethod::Backend,
        })
    }

    fn release(&mut self) {
        self.profiler.release();
        self.verifier.release();
    }
}

/// Picks the strategy for a session.
pub async fn select_matcher(
    backend: Option<Arc<dyn BiometricBackend>>,
    access_key: &str,
    model: Option<&str>,
) -> Box<dyn SpeakerMatcher> {
    let Some(backend) = backend else {
        debug!("no biometric backend configured, using fallback");
        return Box::new(FallbackMatcher::new());
    };
    let name = backend.name().to_string();
    match BiometricMatcher::start(backend, access_key, model).await {
        Ok(m) => {
            info!(backend = %name, "biometric backend selected");
            Box::new(m)
        }
        Err(e) => {
            debug!(backend = %name, "{}; using fallback", e);
            Box::new(FallbackMatcher::new())
        }
    }
}
