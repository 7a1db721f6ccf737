//! WAV file loading and real-time replay.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use tokio::task::JoinHandle;
use tracing::debug;
use voicecheck_engine::FrameFeeder;

/// Decoded mono audio.
#[derive(Debug, Clone)]
pub struct Recording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Recording {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Wall-clock time one frame of `frame_size` samples covers.
    pub fn frame_period(&self, frame_size: usize) -> Duration {
        Duration::from_secs_f64(frame_size as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Loads a WAV file, mixing every channel down to mono `f32` in `[-1, 1]`.
pub fn load_wav(path: impl AsRef<Path>) -> anyhow::Result<Recording> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to decode {}", path.display()))
}

pub fn from_reader<R: Read>(reader: R) -> anyhow::Result<Recording> {
    let mut wav = hound::WavReader::new(reader)?;
    let spec = wav.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => wav.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            wav.samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    debug!(
        rate = spec.sample_rate,
        channels,
        samples = samples.len(),
        "wav decoded"
    );
    Ok(Recording {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Feeds the recording into the pipe at capture speed. Stops early when the
/// session closes the stream. Resolves to the number of frames sent.
pub fn replay(recording: Recording, mut feeder: FrameFeeder, frame_size: usize) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(recording.frame_period(frame_size));
        let mut sent = 0u64;
        for chunk in recording.samples.chunks(frame_size.max(1)) {
            tokio::select! {
                _ = feeder.closed() => break,
                _ = ticker.tick() => {}
            }
            if feeder.send_samples(chunk).await.is_err() {
                break;
            }
            sent += 1;
        }
        debug!(frames = sent, "replay finished");
        sent
    })
}
