//! The capture consumer.
//!
//! One task owns the capture stream, the windowing buffer and the matcher.
//! Frames and verification ticks are handled on that task one at a time, so
//! the buffer is never filled and drained concurrently.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::BiometricBackend;
use crate::capture::{AudioFrameSource, CaptureStream};
use crate::config::EngineConfig;
use crate::enroll::EnrollmentController;
use crate::error::VerifyError;
use crate::event::{DisabledReason, EngineEvent, EventSink};
use crate::frame::AudioFrame;
use crate::matcher::{SpeakerMatcher, select_matcher};
use crate::profile::{ProfileSlot, VoiceProfile};
use crate::verify::VerificationScheduler;
use crate::window::{WindowOutput, WindowingBuffer};

/// Everything the engine task needs from its session.
pub(crate) struct EngineParams {
    pub config: EngineConfig,
    pub access_key: String,
    pub source: Arc<dyn AudioFrameSource>,
    pub backend: Option<Arc<dyn BiometricBackend>>,
    pub profile: Arc<ProfileSlot>,
    pub sink: Arc<EventSink>,
}

/// Handle to a running engine task.
pub(crate) struct EngineHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    capture_opened: bool,
}

impl EngineHandle {
    /// Spawns the engine. Resolves once the capture stream is open (or
    /// failed to open), so callers know capture started before returning.
    pub(crate) async fn spawn(params: EngineParams) -> Self {
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(run(params, cancel.clone(), ready_tx));
        let capture_opened = ready_rx.await.unwrap_or(false);
        Self {
            cancel,
            task,
            capture_opened,
        }
    }

    /// True if the capture stream could not be opened.
    pub(crate) fn capture_failed(&self) -> bool {
        !self.capture_opened
    }

    /// Signals the task to stop without waiting for it.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the task and waits until it has released its resources.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("engine task ended abnormally: {}", e);
        }
    }
}

async fn run(params: EngineParams, cancel: CancellationToken, ready: oneshot::Sender<bool>) {
    let stream = match params.source.open().await {
        Ok(stream) => stream,
        Err(e) => {
            disable_on_open_failure(&params.sink, e);
            let _ = ready.send(false);
            return;
        }
    };
    let started_at = Instant::now();
    let _ = ready.send(true);

    let matcher = select_matcher(
        params.backend.clone(),
        &params.access_key,
        params.config.model.as_deref(),
    )
    .await;

    let mut engine = Engine {
        enrollment: EnrollmentController::new(params.profile.clone(), params.sink.clone()),
        verification: VerificationScheduler::new(
            params.config.verification_period(),
            params.config.match_threshold,
            params.sink.clone(),
        ),
        buffer: WindowingBuffer::new(),
        profile: None,
        config: params.config,
        stream,
        matcher,
        cancel,
    };
    engine.start(started_at);
    engine.run().await;
    engine.shutdown();
}

fn disable_on_open_failure(sink: &EventSink, err: VerifyError) {
    warn!("verification disabled: {}", err);
    let detail = match err {
        VerifyError::PermissionDenied(msg) => msg,
        other => other.to_string(),
    };
    sink.emit(EngineEvent::VerificationDisabled(
        DisabledReason::PermissionDenied(detail),
    ));
}

struct Engine {
    config: EngineConfig,
    stream: CaptureStream,
    buffer: WindowingBuffer,
    matcher: Box<dyn SpeakerMatcher>,
    enrollment: EnrollmentController,
    verification: VerificationScheduler,
    profile: Option<Arc<VoiceProfile>>,
    cancel: CancellationToken,
}

impl Engine {
    /// The enrollment window opens when capture does.
    fn start(&mut self, started_at: Instant) {
        if self
            .buffer
            .start_enrollment(started_at, self.config.enrollment_duration())
        {
            self.enrollment.started(self.matcher.as_ref());
        }
    }

    async fn run(&mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                frame = self.stream.next_frame() => match frame {
                    Some(frame) => self.on_frame(frame).await,
                    None => break,
                },
                _ = self.verification.next_tick() => {
                    self.verification.on_tick(&mut self.buffer);
                }
            }
        }

        info!("capture ended, holding resources until the session finishes");
        self.verification.stop();
        self.cancel.cancelled().await;
    }

    async fn on_frame(&mut self, frame: AudioFrame) {
        if self.buffer.is_enrolling() {
            self.enrollment.on_frame(self.matcher.as_mut(), &frame).await;
        }
        let now = Instant::now();
        match self.buffer.push(frame, now) {
            None => {}
            Some(WindowOutput::EnrollmentClosed(window)) => {
                let installed = self.enrollment.complete(self.matcher.as_mut(), window).await;
                if self.cancel.is_cancelled() {
                    return;
                }
                if let Some(profile) = installed {
                    self.matcher.prepare_verification(&profile).await;
                    self.profile = Some(profile);
                    self.begin_verification();
                }
            }
            Some(WindowOutput::SampleReady(sample)) => {
                let Some(profile) = self.profile.clone() else {
                    return;
                };
                self.verification
                    .score(self.matcher.as_mut(), &profile, sample, &self.cancel)
                    .await;
            }
        }
    }

    fn begin_verification(&mut self) {
        if self.buffer.start_verification(self.config.frames_per_sample) {
            self.verification.start();
        }
    }

    /// Stop verification, stop capture, release backend handles.
    fn shutdown(&mut self) {
        self.verification.stop();
        self.buffer.stop();
        self.stream.close();
        self.matcher.release();
        debug!(matcher = self.matcher.name(), "engine released");
    }
}
