//! Enrollment phase.

use std::sync::Arc;

use tracing::{debug, info};

use crate::event::{EngineEvent, EventSink};
use crate::frame::AudioFrame;
use crate::matcher::SpeakerMatcher;
use crate::profile::{EnrollmentWindow, ProfileSlot, VoiceProfile};

/// Feeds enrollment frames to the matcher and installs the resulting
/// profile once the window closes.
pub(crate) struct EnrollmentController {
    profile: Arc<ProfileSlot>,
    sink: Arc<EventSink>,
    last_progress: Option<f32>,
}

impl EnrollmentController {
    pub(crate) fn new(profile: Arc<ProfileSlot>, sink: Arc<EventSink>) -> Self {
        Self {
            profile,
            sink,
            last_progress: None,
        }
    }

    pub(crate) fn started(&self, matcher: &dyn SpeakerMatcher) {
        info!(matcher = matcher.name(), "enrollment started");
        self.sink.emit(EngineEvent::EnrollmentStarted {
            matcher: matcher.name().to_string(),
        });
    }

    /// Offers a frame for incremental enrollment. Only progress is reported;
    /// backend failures are swallowed by the matcher.
    pub(crate) async fn on_frame(&mut self, matcher: &mut dyn SpeakerMatcher, frame: &AudioFrame) {
        let Some(percent) = matcher.observe_enrollment_frame(frame).await else {
            return;
        };
        // Whole percents only, to keep the event stream quiet.
        if self.last_progress.map(|p| p.floor()) == Some(percent.floor()) {
            return;
        }
        self.last_progress = Some(percent);
        debug!(percent, "enrollment progress");
        self.sink.emit(EngineEvent::EnrollmentProgress { percent });
    }

    /// Builds and installs the profile from a closed window.
    ///
    /// Returns the installed profile, or `None` if a profile already
    /// existed.
    pub(crate) async fn complete(
        &mut self,
        matcher: &mut dyn SpeakerMatcher,
        window: EnrollmentWindow,
    ) -> Option<Arc<VoiceProfile>> {
        let frames = window.len();
        let duration = window.duration().unwrap_or_default();
        let profile = matcher.build_profile(window).await;
        let kind = profile.kind();

        if !self.profile.install(profile) {
            debug!("profile already installed, ignoring second enrollment");
            return None;
        }
        info!(%kind, frames, ?duration, "enrollment complete");
        self.sink.emit(EngineEvent::Enrolled {
            kind,
            frames,
            window: duration,
        });
        self.profile.get()
    }
}
