//! Conversation events consumed and engine events produced.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::matcher::ScoreMethod;
use crate::profile::ProfileKind;
use crate::session::{FinishReason, SessionStatus};

/// Speaker role of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    User,
    System,
}

/// Events from the conversational platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConversationEvent {
    CallStart,
    CallEnd,
    SpeechStart,
    SpeechEnd,
    Message { role: Role, transcript: String },
    Error { message: String },
}

impl ConversationEvent {
    pub fn assistant(transcript: impl Into<String>) -> Self {
        Self::Message {
            role: Role::Assistant,
            transcript: transcript.into(),
        }
    }
}

/// Why verification was switched off for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DisabledReason {
    MissingAccessKey,
    PermissionDenied(String),
}

/// Result of one verification tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub tick: u64,
    pub best_score: f32,
    pub threshold: f32,
    pub method: ScoreMethod,
}

/// Events produced by a [`CallSession`](crate::CallSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    StatusChanged {
        from: SessionStatus,
        to: SessionStatus,
    },
    VerificationDisabled(DisabledReason),
    EnrollmentStarted {
        matcher: String,
    },
    EnrollmentProgress {
        percent: f32,
    },
    Enrolled {
        kind: ProfileKind,
        frames: usize,
        #[serde(with = "millis")]
        window: Duration,
    },
    Match(TickOutcome),
    Mismatch(TickOutcome),
    InterviewerRotated {
        index: usize,
    },
    Finished {
        reason: FinishReason,
    },
}

impl EngineEvent {
    /// Lifecycle events still pass once teardown has begun.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::StatusChanged { .. } | Self::Finished { .. })
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Receiving half of a session's event channel.
pub type EventStream = mpsc::UnboundedReceiver<EngineEvent>;

struct SinkState {
    tx: Option<mpsc::UnboundedSender<EngineEvent>>,
    sealed: bool,
}

/// Shared emitter. Once sealed, only lifecycle events get through; once
/// closed, nothing does.
pub(crate) struct EventSink {
    state: Mutex<SinkState>,
}

impl EventSink {
    pub(crate) fn new() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            state: Mutex::new(SinkState {
                tx: Some(tx),
                sealed: false,
            }),
        };
        (sink, rx)
    }

    /// Sends an event. Returns false if it was dropped.
    pub(crate) fn emit(&self, event: EngineEvent) -> bool {
        let state = self.state.lock();
        if state.sealed && !event.is_lifecycle() {
            return false;
        }
        match &state.tx {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub(crate) fn seal(&self) {
        self.state.lock().sealed = true;
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.sealed = true;
        state.tx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mismatch() -> EngineEvent {
        EngineEvent::Mismatch(TickOutcome {
            tick: 1,
            best_score: 0.1,
            threshold: 0.7,
            method: ScoreMethod::Fallback,
        })
    }

    #[test]
    fn conversation_event_wire_format() {
        let ev: ConversationEvent = serde_json::from_str(r#"{"type":"call-start"}"#).unwrap();
        assert_eq!(ev, ConversationEvent::CallStart);

        let ev: ConversationEvent = serde_json::from_str(
            r#"{"type":"message","role":"assistant","transcript":"Why Rust?"}"#,
        )
        .unwrap();
        assert_eq!(ev, ConversationEvent::assistant("Why Rust?"));

        let json = serde_json::to_string(&ConversationEvent::SpeechEnd).unwrap();
        assert_eq!(json, r#"{"type":"speech-end"}"#);
    }

    #[test]
    fn engine_event_serializes_with_tag() {
        let json = serde_json::to_value(EngineEvent::InterviewerRotated { index: 2 }).unwrap();
        assert_eq!(json["event"], "interviewer_rotated");
        assert_eq!(json["index"], 2);

        let json = serde_json::to_value(EngineEvent::Enrolled {
            kind: ProfileKind::Sample,
            frames: 3,
            window: Duration::from_millis(30_050),
        })
        .unwrap();
        assert_eq!(json["window"], 30_050);
        assert_eq!(json["kind"], "sample");
    }

    #[tokio::test]
    async fn sealed_sink_only_passes_lifecycle() {
        let (sink, mut rx) = EventSink::new();
        assert!(sink.emit(mismatch()));
        sink.seal();
        assert!(!sink.emit(mismatch()));
        assert!(sink.emit(EngineEvent::Finished {
            reason: FinishReason::Disconnected
        }));
        sink.close();
        assert!(!sink.emit(EngineEvent::Finished {
            reason: FinishReason::Disconnected
        }));

        assert_eq!(rx.recv().await, Some(mismatch()));
        assert!(matches!(rx.recv().await, Some(EngineEvent::Finished { .. })));
        assert_eq!(rx.recv().await, None);
    }
}
