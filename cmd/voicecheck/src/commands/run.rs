//! Run a verification session over a recording or the microphone.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use voicecheck_cli::{Script, load_script};
use voicecheck_engine::{
    AudioFrameSource, BiometricBackend, CallSession, DisabledReason, EmbeddingBackend,
    EngineConfig, EngineEvent, FinishReason, FrameFeeder, ProfileKind, SessionStatus,
    StatsEmbedder, frame_pipe,
};

use super::{get_engine_config, output, print_info, print_warning};
use crate::Cli;
use crate::audio::{Recording, load_wav, replay};

/// Session length used with the microphone when there is no script.
const DEFAULT_MIC_SECONDS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Amplitude-statistics embedding backend
    Embedding,
    /// No backend; always use the loudness heuristic
    None,
}

/// Run a verification session.
///
/// Replays a WAV file as if it were the microphone (or captures the real
/// one with --mic) while delivering conversation events from a script.
/// Every engine event is printed as it happens.
#[derive(Args)]
pub struct RunCommand {
    /// WAV file replayed as the microphone, in real time
    #[arg(long, conflicts_with = "mic")]
    audio: Option<String>,

    /// Capture the default input device (needs the cpal-audio feature)
    #[arg(long)]
    mic: bool,

    /// Input device name for --mic
    #[arg(long, requires = "mic")]
    device: Option<String>,

    /// Conversation script (YAML or JSON); default is call-start now and
    /// call-end after --duration
    #[arg(long)]
    script: Option<String>,

    /// Session length in seconds when no script is given (default: the
    /// recording length)
    #[arg(long)]
    duration: Option<u64>,

    /// Biometric backend
    #[arg(long, value_enum, default_value_t = BackendKind::Embedding)]
    backend: BackendKind,
}

/// Counts gathered while the session runs.
#[derive(Debug, Default, Serialize)]
struct Summary {
    enrolled: Option<ProfileKind>,
    ticks: u64,
    matches: u64,
    mismatches: u64,
    lowest_score: Option<f32>,
    rotations: u64,
    disabled: Option<DisabledReason>,
    finish: Option<FinishReason>,
}

impl Summary {
    fn observe(&mut self, ev: &EngineEvent) {
        match ev {
            EngineEvent::Enrolled { kind, .. } => self.enrolled = Some(*kind),
            EngineEvent::Match(o) | EngineEvent::Mismatch(o) => {
                self.ticks += 1;
                if matches!(ev, EngineEvent::Match(_)) {
                    self.matches += 1;
                } else {
                    self.mismatches += 1;
                }
                self.lowest_score = Some(match self.lowest_score {
                    Some(s) => s.min(o.best_score),
                    None => o.best_score,
                });
            }
            EngineEvent::InterviewerRotated { .. } => self.rotations += 1,
            EngineEvent::VerificationDisabled(reason) => self.disabled = Some(reason.clone()),
            EngineEvent::Finished { reason } => self.finish = Some(reason.clone()),
            _ => {}
        }
    }

    fn print(&self) {
        match (&self.disabled, self.enrolled) {
            (Some(reason), _) => print_warning(&format!("verification disabled: {:?}", reason)),
            (None, None) => print_warning("session ended before enrollment completed"),
            (None, Some(kind)) => print_info(&format!("enrolled with a {} profile", kind)),
        }
        print_info(&format!(
            "{} ticks: {} match, {} mismatch{}",
            self.ticks,
            self.matches,
            self.mismatches,
            self.lowest_score
                .map(|s| format!(", lowest score {:.3}", s))
                .unwrap_or_default()
        ));
        if self.rotations > 0 {
            print_info(&format!("interviewer rotated {} times", self.rotations));
        }
    }
}

impl RunCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = get_engine_config(cli)?;
        let backend: Option<Arc<dyn BiometricBackend>> = match self.backend {
            BackendKind::Embedding => Some(Arc::new(EmbeddingBackend::new(Arc::new(
                StatsEmbedder::default(),
            )))),
            BackendKind::None => None,
        };

        let (source, mut pending, natural_length) = self.open_input(&config)?;
        let script = match &self.script {
            Some(path) => load_script(path)?,
            None => {
                let secs = self
                    .duration
                    .map(Duration::from_secs)
                    .or(natural_length)
                    .unwrap_or(Duration::from_secs(DEFAULT_MIC_SECONDS));
                Script::call_of(secs)
            }
        };
        debug!(steps = script.steps.len(), length = ?script.length(), "script loaded");

        let (session, mut events) = CallSession::new(config.clone(), source, backend)?;
        let runner = spawn_script(session.clone(), script);

        let mut out = output(cli)?;
        let mut summary = Summary::default();
        let mut replay_task: Option<JoinHandle<u64>> = None;
        loop {
            let ev = tokio::select! {
                ev = events.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    print_info("interrupted, ending session");
                    session.disconnect().await;
                    continue;
                }
            };
            if let EngineEvent::StatusChanged {
                to: SessionStatus::Active,
                ..
            } = ev
            {
                // Replay starts with capture so the recording lines up with
                // the enrollment window.
                if let Some((recording, feeder)) = pending.take() {
                    replay_task = Some(replay(recording, feeder, config.frame_size));
                }
            }
            summary.observe(&ev);
            out.write_item(&ev)?;
        }

        runner.abort();
        if let Some(task) = replay_task {
            let frames = task.await?;
            debug!(frames, "replay task joined");
        }
        summary.print();
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn open_input(
        &self,
        config: &EngineConfig,
    ) -> anyhow::Result<(
        Arc<dyn AudioFrameSource>,
        Option<(Recording, FrameFeeder)>,
        Option<Duration>,
    )> {
        if let Some(path) = &self.audio {
            let recording = load_wav(path)?;
            let length = recording.duration();
            print_info(&format!(
                "replaying {} ({:.1} s at {} Hz)",
                path,
                length.as_secs_f64(),
                recording.sample_rate
            ));
            let (feeder, source) = frame_pipe(config.frame_size, 64);
            return Ok((source, Some((recording, feeder)), Some(length)));
        }
        if self.mic {
            return Ok((mic_source(config, self.device.clone())?, None, None));
        }
        anyhow::bail!("either --audio <file> or --mic is required")
    }
}

/// Delivers each step at its offset, then disconnects if the script did
/// not end the call.
fn spawn_script(session: CallSession, script: Script) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        for step in script.steps {
            tokio::time::sleep_until(start + step.at()).await;
            debug!(at_ms = step.at_ms, event = ?step.event, "script step");
            if let Err(e) = session.handle_event(step.event).await {
                warn!("script step at {} ms rejected: {}", step.at_ms, e);
            }
        }
        if session.status() != SessionStatus::Finished {
            session.disconnect().await;
        }
    })
}

#[cfg(feature = "cpal-audio")]
fn mic_source(
    config: &EngineConfig,
    device: Option<String>,
) -> anyhow::Result<Arc<dyn AudioFrameSource>> {
    Ok(Arc::new(crate::audio::mic::MicSource::new(
        config.frame_size,
        device,
    )))
}

#[cfg(not(feature = "cpal-audio"))]
fn mic_source(
    _config: &EngineConfig,
    _device: Option<String>,
) -> anyhow::Result<Arc<dyn AudioFrameSource>> {
    anyhow::bail!("built without microphone support; rebuild with --features cpal-audio")
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicecheck_engine::{ScoreMethod, TickOutcome};

    fn tick(n: u64, score: f32) -> TickOutcome {
        TickOutcome {
            tick: n,
            best_score: score,
            threshold: 0.7,
            method: ScoreMethod::Fallback,
        }
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut s = Summary::default();
        s.observe(&EngineEvent::Enrolled {
            kind: ProfileKind::Sample,
            frames: 300,
            window: Duration::from_secs(30),
        });
        s.observe(&EngineEvent::Match(tick(1, 0.9)));
        s.observe(&EngineEvent::Mismatch(tick(2, 0.2)));
        s.observe(&EngineEvent::Mismatch(tick(3, 0.4)));
        s.observe(&EngineEvent::InterviewerRotated { index: 1 });
        s.observe(&EngineEvent::Finished {
            reason: FinishReason::CallEnded,
        });

        assert_eq!(s.enrolled, Some(ProfileKind::Sample));
        assert_eq!((s.ticks, s.matches, s.mismatches), (3, 1, 2));
        assert_eq!(s.lowest_score, Some(0.2));
        assert_eq!(s.rotations, 1);
        assert_eq!(s.finish, Some(FinishReason::CallEnded));
    }

    #[tokio::test(start_paused = true)]
    async fn script_runner_disconnects_when_script_stops_early() {
        let (_feeder, source) = frame_pipe(16, 4);
        let (session, mut events) =
            CallSession::new(EngineConfig::default(), source, None).unwrap();
        let script = Script {
            steps: vec![voicecheck_cli::ScriptStep {
                at_ms: 1_000,
                event: voicecheck_engine::ConversationEvent::CallStart,
            }],
        };
        spawn_script(session.clone(), script).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Finished);

        let mut last = None;
        while let Some(ev) = events.recv().await {
            last = Some(ev);
        }
        assert_eq!(
            last,
            Some(EngineEvent::Finished {
                reason: FinishReason::Disconnected
            })
        );
    }
}
