//! Frame accumulation for enrollment and verification.

use std::time::Duration;

use tokio::time::Instant;

use crate::frame::AudioFrame;
use crate::profile::{EnrollmentWindow, VerificationSample};

/// What a pushed frame completed, if anything.
#[derive(Debug)]
pub enum WindowOutput {
    /// The enrollment deadline passed; the window is closed.
    EnrollmentClosed(EnrollmentWindow),
    /// A verification sample reached its frame count.
    SampleReady(VerificationSample),
}

#[derive(Debug)]
enum Mode {
    Idle,
    Enrollment {
        window: EnrollmentWindow,
        deadline: Duration,
    },
    Verification {
        frames_per_sample: usize,
        current: Option<Vec<AudioFrame>>,
    },
}

/// Routes incoming frames to whichever phase is active.
///
/// Enrollment is bounded by elapsed time, checked on every frame; a sample
/// is bounded by frame count. Verification collects only after
/// [`begin_sample`](Self::begin_sample) and frames outside a sample are
/// dropped, so at most one sample exists at a time.
#[derive(Debug)]
pub struct WindowingBuffer {
    mode: Mode,
    enrolled: bool,
}

impl Default for WindowingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowingBuffer {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            enrolled: false,
        }
    }

    /// Opens the enrollment window at `now`.
    ///
    /// Returns false (and does nothing) once an enrollment has completed or
    /// while one is already open.
    pub fn start_enrollment(&mut self, now: Instant, deadline: Duration) -> bool {
        if self.enrolled || matches!(self.mode, Mode::Enrollment { .. }) {
            return false;
        }
        self.mode = Mode::Enrollment {
            window: EnrollmentWindow::open(now),
            deadline,
        };
        true
    }

    /// Switches to verification mode. Requires a completed enrollment.
    pub fn start_verification(&mut self, frames_per_sample: usize) -> bool {
        if !self.enrolled {
            return false;
        }
        self.mode = Mode::Verification {
            frames_per_sample: frames_per_sample.max(1),
            current: None,
        };
        true
    }

    /// Starts a fresh sample, discarding a partial one.
    pub fn begin_sample(&mut self) -> bool {
        match &mut self.mode {
            Mode::Verification { current, .. } => {
                *current = Some(Vec::new());
                true
            }
            _ => false,
        }
    }

    pub fn is_enrolling(&self) -> bool {
        matches!(self.mode, Mode::Enrollment { .. })
    }

    pub fn is_verifying(&self) -> bool {
        matches!(self.mode, Mode::Verification { .. })
    }

    pub fn is_collecting_sample(&self) -> bool {
        matches!(self.mode, Mode::Verification { current: Some(_), .. })
    }

    /// True once an enrollment window has closed.
    pub fn enrollment_done(&self) -> bool {
        self.enrolled
    }

    /// Hands one frame to the active phase.
    pub fn push(&mut self, frame: AudioFrame, now: Instant) -> Option<WindowOutput> {
        match &mut self.mode {
            Mode::Idle => None,
            Mode::Enrollment { window, deadline } => {
                window.append(frame);
                if now.duration_since(window.started_at()) < *deadline {
                    return None;
                }
                let mut window = std::mem::replace(window, EnrollmentWindow::open(now));
                self.mode = Mode::Idle;
                window.close(now);
                self.enrolled = true;
                Some(WindowOutput::EnrollmentClosed(window))
            }
            Mode::Verification {
                frames_per_sample,
                current,
            } => {
                let frames = current.as_mut()?;
                frames.push(frame);
                if frames.len() < *frames_per_sample {
                    return None;
                }
                current
                    .take()
                    .map(|frames| WindowOutput::SampleReady(VerificationSample::new(frames)))
            }
        }
    }

    /// Stops accepting frames.
    pub fn stop(&mut self) {
        self.mode = Mode::Idle;
    }
}
