//! Periodic re-verification.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::VerifyError;
use crate::event::{EngineEvent, EventSink, TickOutcome};
use crate::matcher::SpeakerMatcher;
use crate::profile::{VerificationSample, VoiceProfile};
use crate::similarity::{best_score, is_match};
use crate::window::WindowingBuffer;

/// Drives one sample-and-score cycle per period once a profile exists.
pub(crate) struct VerificationScheduler {
    period: Duration,
    threshold: f32,
    interval: Option<Interval>,
    ticks: u64,
    sink: Arc<EventSink>,
}

impl VerificationScheduler {
    pub(crate) fn new(period: Duration, threshold: f32, sink: Arc<EventSink>) -> Self {
        Self {
            period,
            threshold,
            interval: None,
            ticks: 0,
            sink,
        }
    }

    /// Arms the timer; the first tick fires one period from now.
    pub(crate) fn start(&mut self) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        info!(period = ?self.period, threshold = self.threshold, "verification started");
    }

    pub(crate) fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub(crate) fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!(ticks = self.ticks, "verification stopped");
        }
    }

    /// Waits for the next tick. Never resolves while stopped.
    pub(crate) async fn next_tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Starts collecting a sample for this tick. A tick that lands while the
    /// previous sample is still being filled or scored is folded into it.
    pub(crate) fn on_tick(&mut self, buffer: &mut WindowingBuffer) -> bool {
        if buffer.is_collecting_sample() {
            debug!(tick = self.ticks, "previous sample still in flight, tick coalesced");
            return false;
        }
        if !buffer.begin_sample() {
            return false;
        }
        self.ticks += 1;
        true
    }

    /// Scores a completed sample and emits the outcome.
    ///
    /// Returns `None` when the tick was skipped or teardown began while
    /// scoring; nothing is emitted in either case.
    pub(crate) async fn score(
        &mut self,
        matcher: &mut dyn SpeakerMatcher,
        profile: &VoiceProfile,
        sample: VerificationSample,
        cancel: &CancellationToken,
    ) -> Option<TickOutcome> {
        let tick = self.ticks;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            r = matcher.score(profile, &sample) => r,
        };

        let scores = match result {
            Ok(scores) => scores,
            Err(e @ VerifyError::BackendCallFailure { .. }) => {
                warn!(tick, "{}; retrying next tick", e);
                return None;
            }
            Err(e) => {
                warn!(tick, "tick skipped: {}", e);
                return None;
            }
        };
        let (Some(best), Some(matched)) = (
            best_score(&scores.values),
            is_match(&scores.values, self.threshold),
        ) else {
            warn!(tick, "tick skipped: no usable scores");
            return None;
        };
        if cancel.is_cancelled() {
            return None;
        }

        let outcome = TickOutcome {
            tick,
            best_score: best,
            threshold: self.threshold,
            method: scores.method,
        };
        if matched {
            debug!(tick, score = best, "speaker verified");
            self.sink.emit(EngineEvent::Match(outcome.clone()));
        } else {
            warn!(tick, score = best, threshold = self.threshold, "speaker mismatch");
            self.sink.emit(EngineEvent::Mismatch(outcome.clone()));
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AudioFrame;
    use crate::matcher::FallbackMatcher;

    fn frames(level: f32, n: usize) -> Vec<AudioFrame> {
        (0..n)
            .map(|i| AudioFrame::new(vec![level, -level], i as u64))
            .collect()
    }

    fn verifying_buffer() -> WindowingBuffer {
        let now = Instant::now();
        let mut buf = WindowingBuffer::new();
        buf.start_enrollment(now, Duration::ZERO);
        buf.push(AudioFrame::new(vec![0.1], 0), now);
        assert!(buf.start_verification(2));
        buf
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_one_period_out() {
        let (sink, _rx) = EventSink::new();
        let mut v = VerificationScheduler::new(Duration::from_secs(5), 0.7, Arc::new(sink));
        assert!(!v.is_running());
        v.start();
        assert!(v.is_running());

        let start = Instant::now();
        v.next_tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        v.stop();
        assert!(!v.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_during_collection_is_coalesced() {
        let (sink, _rx) = EventSink::new();
        let mut v = VerificationScheduler::new(Duration::from_secs(5), 0.7, Arc::new(sink));
        let mut buf = verifying_buffer();

        assert!(v.on_tick(&mut buf));
        assert!(!v.on_tick(&mut buf));
        assert_eq!(v.ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn score_emits_match_or_mismatch() {
        let (sink, mut rx) = EventSink::new();
        let mut v = VerificationScheduler::new(Duration::from_secs(5), 0.7, Arc::new(sink));
        let mut matcher = FallbackMatcher::new();
        let profile = VoiceProfile::sample(frames(0.5, 4));
        let cancel = CancellationToken::new();

        let same = v
            .score(&mut matcher, &profile, VerificationSample::new(frames(0.5, 2)), &cancel)
            .await
            .unwrap();
        assert!(same.best_score >= 0.99);
        assert!(matches!(rx.recv().await, Some(EngineEvent::Match(_))));

        let quiet = v
            .score(&mut matcher, &profile, VerificationSample::new(frames(0.05, 2)), &cancel)
            .await
            .unwrap();
        assert!((quiet.best_score - 0.1).abs() < 1e-5);
        assert!(matches!(rx.recv().await, Some(EngineEvent::Mismatch(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn score_equal_to_threshold_is_a_match() {
        let (sink, mut rx) = EventSink::new();
        let mut v = VerificationScheduler::new(Duration::from_secs(5), 1.0, Arc::new(sink));
        let mut matcher = FallbackMatcher::new();
        let profile = VoiceProfile::sample(frames(0.25, 4));

        let outcome = v
            .score(
                &mut matcher,
                &profile,
                VerificationSample::new(frames(0.25, 2)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.best_score, 1.0);
        assert!(matches!(rx.recv().await, Some(EngineEvent::Match(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_scoring_emits_nothing() {
        let (sink, mut rx) = EventSink::new();
        let mut v = VerificationScheduler::new(Duration::from_secs(5), 0.7, Arc::new(sink));
        let mut matcher = FallbackMatcher::new();
        let profile = VoiceProfile::sample(frames(0.5, 4));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = v
            .score(&mut matcher, &profile, VerificationSample::new(frames(0.5, 2)), &cancel)
            .await;
        assert!(outcome.is_none());
        assert!(rx.try_recv().is_err());
    }
}
