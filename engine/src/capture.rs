//! Capture sources and streams.
//!
//! An [`AudioFrameSource`] opens a [`CaptureStream`]; the stream yields
//! frames in capture order until it is closed. [`frame_pipe`] provides an
//! in-process source fed from a [`FrameFeeder`], used for file replay and
//! tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::VerifyError;
use crate::frame::{AudioFrame, Framer};

/// Opens microphone-like capture streams.
#[async_trait]
pub trait AudioFrameSource: Send + Sync {
    /// Opens the stream, or fails with [`VerifyError::PermissionDenied`].
    async fn open(&self) -> Result<CaptureStream, VerifyError>;
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// An open capture stream. Closing is idempotent and also happens on drop.
pub struct CaptureStream {
    frames: mpsc::Receiver<AudioFrame>,
    on_close: Option<CloseHook>,
}

impl CaptureStream {
    /// Wraps a frame receiver. `on_close` runs exactly once, on the first
    /// [`close`](Self::close) or on drop.
    pub fn new(frames: mpsc::Receiver<AudioFrame>, on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            frames,
            on_close: Some(Box::new(on_close)),
        }
    }

    /// Waits for the next frame. `None` once the producer is gone or the
    /// stream is closed.
    pub async fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.on_close.is_none() {
            return None;
        }
        self.frames.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.on_close.is_none()
    }

    /// Stops the stream. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(hook) = self.on_close.take() {
            self.frames.close();
            hook();
            debug!("capture stream closed");
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Error returned when sending into a pipe whose stream is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("capture stream closed")]
pub struct PipeClosed;

/// Producer half of a [`frame_pipe`].
pub struct FrameFeeder {
    tx: mpsc::Sender<AudioFrame>,
    framer: Framer,
    stopped: CancellationToken,
}

impl FrameFeeder {
    /// Sends one already-built frame.
    pub async fn send(&self, frame: AudioFrame) -> Result<(), PipeClosed> {
        if self.stopped.is_cancelled() {
            return Err(PipeClosed);
        }
        self.tx.send(frame).await.map_err(|_| PipeClosed)
    }

    /// Re-chunks raw samples into fixed-size frames and sends every
    /// complete one.
    pub async fn send_samples(&mut self, samples: &[f32]) -> Result<(), PipeClosed> {
        for frame in self.framer.push(samples) {
            self.send(frame).await?;
        }
        Ok(())
    }

    /// Resolves once the consumer closes the stream.
    pub async fn closed(&self) {
        self.stopped.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.stopped.is_cancelled() || self.tx.is_closed()
    }
}

/// Consumer half of a [`frame_pipe`]; implements [`AudioFrameSource`].
pub struct PipeSource {
    rx: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    stopped: CancellationToken,
    deny: AtomicBool,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl PipeSource {
    /// Makes the next [`open`](AudioFrameSource::open) fail as if the
    /// microphone permission was refused.
    pub fn deny_permission(&self) {
        self.deny.store(true, Ordering::SeqCst);
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of times an opened stream was closed.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioFrameSource for PipeSource {
    async fn open(&self) -> Result<CaptureStream, VerifyError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VerifyError::PermissionDenied("microphone access refused".into()));
        }
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| VerifyError::PermissionDenied("capture device already in use".into()))?;
        self.opens.fetch_add(1, Ordering::SeqCst);

        let stopped = self.stopped.clone();
        let closes = self.closes.clone();
        Ok(CaptureStream::new(rx, move || {
            closes.fetch_add(1, Ordering::SeqCst);
            stopped.cancel();
        }))
    }
}

/// Creates a connected feeder/source pair.
pub fn frame_pipe(frame_size: usize, capacity: usize) -> (FrameFeeder, Arc<PipeSource>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stopped = CancellationToken::new();
    let feeder = FrameFeeder {
        tx,
        framer: Framer::new(frame_size),
        stopped: stopped.clone(),
    };
    let source = Arc::new(PipeSource {
        rx: Mutex::new(Some(rx)),
        stopped,
        deny: AtomicBool::new(false),
        opens: AtomicUsize::new(0),
        closes: Arc::new(AtomicUsize::new(0)),
    });
    (feeder, source)
}
