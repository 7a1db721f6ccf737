//! Continuous speaker-consistency verification for live voice sessions.
//!
//! A [`CallSession`] checks, for the whole length of a call, that the person
//! speaking after an initial enrollment window is the person who spoke
//! during it.
//!
//! # Pipeline
//!
//! ```text
//! AudioFrameSource -> WindowingBuffer -> enrollment | verification -> EngineEvent
//! ```
//!
//! 1. On `call-start` the session opens capture and collects frames for the
//!    enrollment window (30 s by default).
//! 2. The closed window becomes a [`VoiceProfile`]: exported by a
//!    [`BiometricBackend`] when one accepts the access key, otherwise the raw
//!    reference frames.
//! 3. Every verification period (5 s) the next 10 frames are scored against
//!    the profile; a best score under the threshold emits
//!    [`EngineEvent::Mismatch`].
//!
//! Independently, assistant turns that read like questions rotate the
//! interviewer panel after a short delay.
//!
//! # Degraded paths
//!
//! Nothing but `call-end`, an upstream `error` or [`CallSession::disconnect`]
//! ends a session. A refused microphone or a missing access key disables
//! verification; a failing backend falls back to the loudness heuristic in
//! [`similarity`].

mod backend;
mod capture;
mod config;
pub mod embedding;
mod engine;
mod enroll;
mod error;
mod event;
mod frame;
mod matcher;
mod profile;
mod rotation;
mod session;
pub mod similarity;
mod verify;
mod window;

pub use backend::{BackendHandle, BiometricBackend, Profiler, Release, Verifier};
pub use capture::{AudioFrameSource, CaptureStream, FrameFeeder, PipeClosed, PipeSource, frame_pipe};
pub use config::*;
pub use embedding::{EmbeddingBackend, SpeakerEmbedder, StatsEmbedder};
pub use error::{BackendError, ConfigError, SessionError, VerifyError};
pub use event::{ConversationEvent, DisabledReason, EngineEvent, EventStream, Role, TickOutcome};
pub use frame::{AudioFrame, Framer, concat_samples};
pub use matcher::{BiometricMatcher, FallbackMatcher, ScoreMethod, Scores, SpeakerMatcher, select_matcher};
pub use profile::{EnrollmentWindow, ProfileKind, ProfileSlot, VerificationSample, VoiceProfile};
pub use rotation::is_question;
pub use session::{CallSession, FinishReason, SessionStatus};
pub use window::{WindowOutput, WindowingBuffer};
