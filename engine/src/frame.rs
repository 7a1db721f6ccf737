//! Audio frames and the fixed-size framer.

use std::sync::Arc;

/// One fixed-size block of mono `f32` samples.
///
/// Frames are immutable and cheap to clone; the sample storage is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Arc<[f32]>,
    sequence: u64,
}

impl AudioFrame {
    /// Creates a frame from captured samples.
    pub fn new(samples: impl Into<Arc<[f32]>>, sequence: u64) -> Self {
        Self {
            samples: samples.into(),
            sequence,
        }
    }

    /// Returns the samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the frame holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Capture order, starting at 0 for the first frame of a stream.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Mean absolute amplitude. 0 for an empty frame.
    pub fn mean_abs(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|s| s.abs() as f64).sum();
        (sum / self.samples.len() as f64) as f32
    }
}

/// Concatenates the samples of several frames.
pub fn concat_samples(frames: &[AudioFrame]) -> Vec<f32> {
    let total = frames.iter().map(AudioFrame::len).sum();
    let mut out = Vec::with_capacity(total);
    for f in frames {
        out.extend_from_slice(f.samples());
    }
    out
}

/// Cuts an arbitrary stream of samples into frames of exactly `frame_size`.
///
/// Capture callbacks deliver buffers of whatever size the device picks;
/// the framer keeps the remainder until the next push.
#[derive(Debug)]
pub struct Framer {
    frame_size: usize,
    pending: Vec<f32>,
    next_sequence: u64,
}

impl Framer {
    /// Creates a framer. A zero `frame_size` is treated as 1.
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
            next_sequence: 0,
        }
    }

    /// Returns the configured frame size.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Appends samples and returns every frame that became complete.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::with_capacity(self.pending.len() / self.frame_size);
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let full = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(full, self.next_sequence));
            self.next_sequence += 1;
        }
        frames
    }

    /// Number of buffered samples not yet forming a frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
