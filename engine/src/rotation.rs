//! Interviewer rotation.
//!
//! The panel index advances one step, modulo the panel size, a fixed delay
//! after each assistant turn that reads like a question. The delay runs on
//! its own task so it never waits on the verification engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::{EngineEvent, EventSink};

// Lead words only count at the start of a sentence, optionally after a
// short discourse marker ("So, how ...", "Okay. Tell me ...").
static QUESTION_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[.!;:]\s+)\s*(?:(?:so|and|now|okay|ok|well|great|alright|then),?\s+)?(?:tell me|can you|could you|would you|describe|explain|walk me through|what|how|why|when|where|which|who)\b",
    )
    .unwrap()
});

/// True if an assistant transcript should hand the floor to the next
/// interviewer.
pub fn is_question(transcript: &str) -> bool {
    transcript.contains('?') || QUESTION_LEAD.is_match(transcript)
}

pub(crate) struct RotationScheduler {
    panel_size: usize,
    delay: Duration,
    index: Arc<AtomicUsize>,
    generation: Mutex<CancellationToken>,
    cleared: AtomicBool,
    sink: Arc<EventSink>,
}

impl RotationScheduler {
    pub(crate) fn new(panel_size: usize, delay: Duration, sink: Arc<EventSink>) -> Self {
        Self {
            panel_size: panel_size.max(1),
            delay,
            index: Arc::new(AtomicUsize::new(0)),
            generation: Mutex::new(CancellationToken::new()),
            cleared: AtomicBool::new(false),
            sink,
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Back to the first interviewer; pending advances are dropped.
    pub(crate) fn reset(&self) {
        self.cancel_pending();
        self.index.store(0, Ordering::SeqCst);
    }

    /// Schedules an advance if the transcript is a question.
    pub(crate) fn on_assistant_turn(&self, transcript: &str) -> bool {
        if !is_question(transcript) {
            return false;
        }
        let token = {
            let generation = self.generation.lock();
            if self.cleared.load(Ordering::SeqCst) {
                return false;
            }
            generation.child_token()
        };
        let index = self.index.clone();
        let sink = self.sink.clone();
        let panel = self.panel_size;
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if token.is_cancelled() {
                        return;
                    }
                    let prev = index
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1) % panel))
                        .unwrap_or_default();
                    let next = (prev + 1) % panel;
                    debug!(from = prev, to = next, "interviewer rotated");
                    sink.emit(EngineEvent::InterviewerRotated { index: next });
                }
            }
        });
        true
    }

    /// Stops for good; later questions are ignored.
    ///
    /// The generation token stays cancelled, so an advance scheduled
    /// concurrently is born cancelled.
    pub(crate) fn clear(&self) {
        let generation = self.generation.lock();
        self.cleared.store(true, Ordering::SeqCst);
        generation.cancel();
    }

    fn cancel_pending(&self) {
        let mut generation = self.generation.lock();
        generation.cancel();
        if !self.cleared.load(Ordering::SeqCst) {
            *generation = CancellationToken::new();
        }
    }
}

impl Drop for RotationScheduler {
    fn drop(&mut self) {
        self.generation.lock().cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> (RotationScheduler, crate::event::EventStream) {
        let (sink, rx) = EventSink::new();
        (
            RotationScheduler::new(3, Duration::from_secs(2), Arc::new(sink)),
            rx,
        )
    }

    #[test]
    fn question_detection() {
        assert!(is_question("Where do you see yourself in five years?"));
        assert!(is_question("Tell me about a project you led."));
        assert!(is_question("Walk me through your last deployment."));
        assert!(!is_question("Thanks, that is all from me."));
        assert!(!is_question("Great answer."));
    }

    #[test]
    fn lead_words_only_count_at_sentence_start() {
        assert!(!is_question("Great, that's exactly what I wanted to hear."));
        assert!(!is_question("Okay, we'll talk when you're ready."));
        assert!(!is_question("I know how hard that must have been."));
        assert!(is_question("Thanks. Now, describe your current role."));
        assert!(is_question("So, how did the migration go"));
        assert!(is_question("  Explain the trade-offs you made."));
    }

    #[tokio::test(start_paused = true)]
    async fn advances_after_delay_and_wraps() {
        let (rot, mut rx) = scheduler();
        let mut seen = vec![rot.index()];
        for _ in 0..4 {
            assert!(rot.on_assistant_turn("Why?"));
            tokio::time::sleep(Duration::from_millis(1_999)).await;
            assert_eq!(rot.index(), *seen.last().unwrap());
            tokio::time::sleep(Duration::from_millis(2)).await;
            seen.push(rot.index());
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
        assert_eq!(
            rx.recv().await,
            Some(EngineEvent::InterviewerRotated { index: 1 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn statements_do_not_rotate() {
        let (rot, _rx) = scheduler();
        assert!(!rot.on_assistant_turn("Noted."));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rot.index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_drops_pending_advance() {
        let (rot, _rx) = scheduler();
        rot.on_assistant_turn("How so?");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(rot.index(), 1);

        rot.on_assistant_turn("And then?");
        tokio::time::sleep(Duration::from_secs(1)).await;
        rot.reset();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(rot.index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_scheduler_ignores_questions() {
        let (rot, _rx) = scheduler();
        rot.on_assistant_turn("What next?");
        rot.clear();
        assert!(!rot.on_assistant_turn("What next?"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(rot.index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_generation_stays_cancelled() {
        let (rot, _rx) = scheduler();
        rot.clear();
        // An advance that raced past the question check would take its
        // token from here; it must already be cancelled.
        let late = rot.generation.lock().child_token();
        assert!(late.is_cancelled());
        assert!(!rot.on_assistant_turn("What next?"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(rot.index(), 0);
    }
}
