//! Session lifecycle.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::BiometricBackend;
use crate::capture::AudioFrameSource;
use crate::config::EngineConfig;
use crate::engine::{EngineHandle, EngineParams};
use crate::error::SessionError;
use crate::event::{ConversationEvent, DisabledReason, EngineEvent, EventSink, EventStream, Role};
use crate::profile::{ProfileSlot, VoiceProfile};
use crate::rotation::RotationScheduler;

/// Lifecycle state of a [`CallSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Inactive,
    Connecting,
    Active,
    Finished,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inactive => "inactive",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// What ended a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinishReason {
    /// The platform reported a normal call end.
    CallEnded,
    /// The host called [`CallSession::disconnect`].
    Disconnected,
    /// The platform reported a fatal error.
    UpstreamError { message: String },
}

/// A live voice session.
///
/// Cloning is cheap; all clones drive the same session. Entering
/// [`SessionStatus::Active`] opens capture, starts enrollment and resets the
/// interviewer rotation. Entering [`SessionStatus::Finished`] tears
/// everything down exactly once, no matter how many triggers race for it.
#[derive(Clone)]
pub struct CallSession {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    source: Arc<dyn AudioFrameSource>,
    backend: Option<Arc<dyn BiometricBackend>>,
    status: Mutex<SessionStatus>,
    engine: tokio::sync::Mutex<Option<EngineHandle>>,
    verification_disabled: AtomicBool,
    profile: Arc<ProfileSlot>,
    rotation: RotationScheduler,
    sink: Arc<EventSink>,
    torn_down: CancellationToken,
}

impl CallSession {
    /// Creates an inactive session and the stream its events arrive on.
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn AudioFrameSource>,
        backend: Option<Arc<dyn BiometricBackend>>,
    ) -> Result<(Self, EventStream), SessionError> {
        config.validate()?;
        let (sink, events) = EventSink::new();
        let sink = Arc::new(sink);
        let rotation =
            RotationScheduler::new(config.panel_size, config.rotation_delay(), sink.clone());
        let inner = Inner {
            config,
            source,
            backend,
            status: Mutex::new(SessionStatus::Inactive),
            engine: tokio::sync::Mutex::new(None),
            verification_disabled: AtomicBool::new(false),
            profile: Arc::new(ProfileSlot::new()),
            rotation,
            sink,
            torn_down: CancellationToken::new(),
        };
        Ok((
            Self {
                inner: Arc::new(inner),
            },
            events,
        ))
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.lock()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Current interviewer index in `[0, panel_size)`.
    pub fn rotation_index(&self) -> usize {
        self.inner.rotation.index()
    }

    pub fn profile(&self) -> Option<Arc<VoiceProfile>> {
        self.inner.profile.get()
    }

    pub fn is_enrolled(&self) -> bool {
        self.inner.profile.is_set()
    }

    /// True if this session will never verify: no access key, or capture
    /// could not be opened.
    pub fn verification_disabled(&self) -> bool {
        self.inner.verification_disabled.load(Ordering::SeqCst)
    }

    /// `Inactive -> Connecting`.
    pub fn connect(&self) -> Result<(), SessionError> {
        self.transition(&[SessionStatus::Inactive], SessionStatus::Connecting)
            .map(|_| ())
    }

    /// `Connecting -> Inactive`, after the platform failed to start.
    pub fn connect_failed(&self) -> Result<(), SessionError> {
        self.transition(&[SessionStatus::Connecting], SessionStatus::Inactive)
            .map(|_| ())
    }

    /// Applies one conversational-platform event.
    pub async fn handle_event(&self, event: ConversationEvent) -> Result<(), SessionError> {
        match event {
            ConversationEvent::CallStart => self.activate().await,
            ConversationEvent::CallEnd => {
                self.finish(FinishReason::CallEnded).await;
                Ok(())
            }
            ConversationEvent::Error { message } => {
                warn!("upstream error: {}", message);
                self.finish(FinishReason::UpstreamError { message }).await;
                Ok(())
            }
            ConversationEvent::Message {
                role: Role::Assistant,
                transcript,
            } => {
                if self.status() == SessionStatus::Active {
                    self.inner.rotation.on_assistant_turn(&transcript);
                }
                Ok(())
            }
            other => {
                debug!(?other, "conversation event ignored");
                Ok(())
            }
        }
    }

    /// Ends the session from the host side.
    pub async fn disconnect(&self) -> bool {
        self.finish(FinishReason::Disconnected).await
    }

    /// Resolves once teardown has completed.
    pub async fn finished(&self) {
        self.inner.torn_down.cancelled().await
    }

    async fn activate(&self) -> Result<(), SessionError> {
        let from = self.transition(
            &[SessionStatus::Inactive, SessionStatus::Connecting],
            SessionStatus::Active,
        )?;
        if from == SessionStatus::Active {
            return Ok(());
        }
        self.inner.rotation.reset();

        let mut engine = self.inner.engine.lock().await;
        if self.status() != SessionStatus::Active || engine.is_some() || self.is_enrolled() {
            return Ok(());
        }
        let Some(access_key) = self.inner.config.access_key() else {
            if !self.inner.verification_disabled.swap(true, Ordering::SeqCst) {
                info!("no access key configured, verification disabled");
                self.inner.sink.emit(EngineEvent::VerificationDisabled(
                    DisabledReason::MissingAccessKey,
                ));
            }
            return Ok(());
        };

        let handle = EngineHandle::spawn(EngineParams {
            config: self.inner.config.clone(),
            access_key: access_key.to_string(),
            source: self.inner.source.clone(),
            backend: self.inner.backend.clone(),
            profile: self.inner.profile.clone(),
            sink: self.inner.sink.clone(),
        })
        .await;
        if handle.capture_failed() {
            self.inner.verification_disabled.store(true, Ordering::SeqCst);
        }
        *engine = Some(handle);
        Ok(())
    }

    /// Moves to `to` if the current status is one of `allowed`. Returns the
    /// previous status; a no-op move to the current status is accepted for
    /// `Active`.
    fn transition(
        &self,
        allowed: &[SessionStatus],
        to: SessionStatus,
    ) -> Result<SessionStatus, SessionError> {
        let from = {
            let mut status = self.inner.status.lock();
            let from = *status;
            if from == to && to == SessionStatus::Active {
                return Ok(from);
            }
            if from == SessionStatus::Inactive && to == SessionStatus::Active {
                // call-start without an explicit connect
                *status = SessionStatus::Connecting;
                self.inner.sink.emit(EngineEvent::StatusChanged {
                    from,
                    to: SessionStatus::Connecting,
                });
            } else if !allowed.contains(&from) {
                return Err(SessionError::InvalidTransition { from, to });
            }
            let prev = *status;
            *status = to;
            self.inner.sink.emit(EngineEvent::StatusChanged { from: prev, to });
            prev
        };
        info!(%from, %to, "session status changed");
        Ok(from)
    }

    /// Tears the session down. Only the first caller does the work; later
    /// callers wait for it to finish and return false.
    async fn finish(&self, reason: FinishReason) -> bool {
        let from = {
            let mut status = self.inner.status.lock();
            let from = *status;
            if from != SessionStatus::Finished {
                *status = SessionStatus::Finished;
                self.inner.sink.seal();
                self.inner.sink.emit(EngineEvent::StatusChanged {
                    from,
                    to: SessionStatus::Finished,
                });
            }
            from
        };
        if from == SessionStatus::Finished {
            debug!(?reason, "session already finished");
            self.inner.torn_down.cancelled().await;
            return false;
        }
        info!(%from, ?reason, "session finishing");

        let engine = self.inner.engine.lock().await.take();
        if let Some(engine) = engine {
            engine.shutdown().await;
        }
        self.inner.rotation.clear();
        self.inner.profile.clear();

        self.inner.sink.emit(EngineEvent::Finished { reason });
        self.inner.sink.close();
        self.inner.torn_down.cancel();
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.get_mut().as_ref() {
            engine.cancel();
        }
    }
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSession")
            .field("status", &self.status())
            .field("enrolled", &self.is_enrolled())
            .field("rotation_index", &self.rotation_index())
            .finish()
    }
}
