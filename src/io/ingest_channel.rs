//! Typed channel feeding the frame pipeline
//!
//! Frames and control commands share one bounded, ordered channel. Frames are
//! offered with `try_send` and dropped while the worker is busy; controls are
//! awaited and never dropped, so they stay ordered relative to the frames
//! around them.

use crate::domain::types::Frame;
use crate::infra::metrics::Metrics;
use crate::services::session::ExportReport;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Minimum spacing between "frame dropped" warnings
const DROP_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Recording and classifier controls
#[derive(Debug)]
pub enum ControlCommand {
    StartRecording,
    /// Stop and export; the report is sent back when `reply` is set
    StopRecording { reply: Option<oneshot::Sender<ExportReport>> },
    SetMouthThreshold(i64),
    ResetMouthThreshold,
}

/// Everything the pipeline worker consumes
#[derive(Debug)]
pub enum PipelineInput {
    Frame(Frame),
    Control(ControlCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Pipeline channel closed")]
pub struct ChannelClosed;

/// Result of offering a frame without waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Worker busy, frame discarded
    Dropped,
    Closed,
}

/// Producer handle. Clone to share across producers.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<PipelineInput>,
    metrics: Arc<Metrics>,
    last_drop_warn: Arc<Mutex<Option<Instant>>>,
}

impl FrameSender {
    pub fn new(tx: mpsc::Sender<PipelineInput>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics, last_drop_warn: Arc::new(Mutex::new(None)) }
    }

    /// Live-camera path: never blocks, drops the frame when the queue is full
    pub fn offer_frame(&self, frame: Frame) -> Offer {
        self.metrics.record_frame_received();
        match self.tx.try_send(PipelineInput::Frame(frame)) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Full(_)) => {
                self.metrics.record_frame_dropped();
                let mut last = self.last_drop_warn.lock();
                if last.map_or(true, |t| t.elapsed() > DROP_WARN_INTERVAL) {
                    warn!(dropped_total = self.metrics.frames_dropped(), "frame_dropped_worker_busy");
                    *last = Some(Instant::now());
                }
                Offer::Dropped
            }
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Lossless path: waits for queue space
    pub async fn send_frame(&self, frame: Frame) -> Result<(), ChannelClosed> {
        self.metrics.record_frame_received();
        self.tx.send(PipelineInput::Frame(frame)).await.map_err(|_| ChannelClosed)
    }

    pub async fn send_control(&self, command: ControlCommand) -> Result<(), ChannelClosed> {
        self.tx.send(PipelineInput::Control(command)).await.map_err(|_| ChannelClosed)
    }

    pub async fn start_recording(&self) -> Result<(), ChannelClosed> {
        self.send_control(ControlCommand::StartRecording).await
    }

    /// Stop and wait for the export report
    pub async fn stop_recording(&self) -> Result<ExportReport, ChannelClosed> {
        let (reply, rx) = oneshot::channel();
        self.send_control(ControlCommand::StopRecording { reply: Some(reply) }).await?;
        rx.await.map_err(|_| ChannelClosed)
    }
}

/// Create the pipeline channel. `depth` is clamped to at least 1.
pub fn create_pipeline_channel(
    depth: usize,
    metrics: Arc<Metrics>,
) -> (FrameSender, mpsc::Receiver<PipelineInput>) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (FrameSender::new(tx, metrics), rx)
}
