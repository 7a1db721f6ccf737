//! Live microphone capture through cpal.
//!
//! `cpal::Stream` is not `Send`, so each open stream lives on its own
//! thread; the capture callback mixes to mono, re-chunks into frames and
//! hands them to the engine over a bounded channel. Frames are dropped, not
//! queued, when the engine falls behind.

use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use voicecheck_engine::{AudioFrameSource, CaptureStream, Framer, VerifyError};

/// Default input device of the default host.
pub struct MicSource {
    frame_size: usize,
    device_name: Option<String>,
}

impl MicSource {
    pub fn new(frame_size: usize, device_name: Option<String>) -> Self {
        Self {
            frame_size,
            device_name,
        }
    }
}

#[async_trait]
impl AudioFrameSource for MicSource {
    async fn open(&self) -> Result<CaptureStream, VerifyError> {
        let (frames_tx, frames_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let frame_size = self.frame_size;
        let device_name = self.device_name.clone();

        thread::Builder::new()
            .name("voicecheck-mic".into())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), frame_size, frames_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Park until the engine closes the stream.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("microphone stream dropped");
            })
            .map_err(|e| VerifyError::PermissionDenied(format!("capture thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(CaptureStream::new(frames_rx, move || {
                let _ = stop_tx.send(());
            })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VerifyError::PermissionDenied(
                "capture thread exited".into(),
            )),
        }
    }
}

fn denied(what: &str, e: impl std::fmt::Display) -> VerifyError {
    VerifyError::PermissionDenied(format!("{}: {}", what, e))
}

fn build_stream(
    device_name: Option<&str>,
    frame_size: usize,
    frames: mpsc::Sender<voicecheck_engine::AudioFrame>,
) -> Result<cpal::Stream, VerifyError> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| denied("failed to enumerate devices", e))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| VerifyError::PermissionDenied(format!("device '{}' not found", name)))?,
        None => host
            .default_input_device()
            .ok_or_else(|| VerifyError::PermissionDenied("no input device".into()))?,
    };
    let config = device
        .default_input_config()
        .map_err(|e| denied("failed to query input config", e))?;
    let channels = config.channels().max(1) as usize;
    info!(
        device = %device.name().unwrap_or_default(),
        channels,
        format = ?config.sample_format(),
        "microphone opened"
    );

    let stream_config: cpal::StreamConfig = config.clone().into();
    let err_callback = |err: cpal::StreamError| warn!("audio stream error: {}", err);
    let mut framer = Framer::new(frame_size);
    let mut deliver = move |mono: Vec<f32>| {
        for frame in framer.push(&mono) {
            if frames.try_send(frame).is_err() {
                debug!("engine busy, frame dropped");
            }
        }
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| deliver(mix(data, channels)),
            err_callback,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let f: Vec<f32> = data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                deliver(mix(&f, channels))
            },
            err_callback,
            None,
        ),
        fmt => {
            return Err(VerifyError::PermissionDenied(format!(
                "unsupported sample format {:?}",
                fmt
            )));
        }
    }
    .map_err(|e| denied("failed to build input stream", e))?;

    stream.play().map_err(|e| denied("failed to start input stream", e))?;
    Ok(stream)
}

/// Averages interleaved channels.
fn mix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|c| c.iter().sum::<f32>() / channels as f32)
        .collect()
}
