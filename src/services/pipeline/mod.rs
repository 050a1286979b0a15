//! Frame pipeline worker
//!
//! The FramePipeline is the single consumer of the ingest channel. Per frame it:
//! - opens a sample in the recording session (when recording)
//! - runs face and pose detection through the `VisionDetector`
//! - classifies mouth and hands on projected coordinates
//! - publishes the resulting `DisplayState`
//!
//! Control commands arrive on the same channel and are applied in order.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::sample::epoch_ms;
use crate::domain::types::{DisplayState, Frame};
use crate::infra::config::{Config, TimestampSource};
use crate::infra::metrics::Metrics;
use crate::io::ingest_channel::PipelineInput;
use crate::services::classifier::MouthThreshold;
use crate::services::detector::VisionDetector;
use crate::services::projection::{Projection, ViewSize};
use crate::services::session::RecordingSession;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Turns frames into display state and recorded samples
pub struct FramePipeline<D: VisionDetector> {
    pub(crate) detector: D,
    pub(crate) session: RecordingSession,
    pub(crate) threshold: MouthThreshold,
    pub(crate) view: ViewSize,
    pub(crate) timestamp_source: TimestampSource,
    /// Last published state; fields persist until a frame overwrites them
    pub(crate) display: DisplayState,
    pub(crate) display_tx: watch::Sender<DisplayState>,
    pub(crate) metrics: Arc<Metrics>,
}

impl<D: VisionDetector> FramePipeline<D> {
    pub fn new(
        config: &Config,
        detector: D,
        session: RecordingSession,
        threshold: MouthThreshold,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (display_tx, _) = watch::channel(DisplayState::default());
        Self {
            detector,
            session,
            threshold,
            view: ViewSize::new(config.view_width(), config.view_height()),
            timestamp_source: config.timestamp_source(),
            display: DisplayState::default(),
            display_tx,
            metrics,
        }
    }

    /// Receiver that sees every display change
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.display_tx.subscribe()
    }

    pub fn display(&self) -> DisplayState {
        self.display
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    /// Consume inputs until the channel closes or shutdown is signalled.
    /// A recording still active at that point is stopped and exported.
    pub async fn run(
        &mut self,
        mut input_rx: mpsc::Receiver<PipelineInput>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                input = input_rx.recv() => {
                    match input {
                        Some(PipelineInput::Frame(frame)) => {
                            self.process_frame(&frame);
                        }
                        Some(PipelineInput::Control(command)) => self.handle_control(command),
                        None => {
                            debug!("pipeline_input_closed");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("pipeline_shutdown");
                        break;
                    }
                }
            }
        }

        if self.session.is_recording() {
            info!("stopping_active_recording");
            self.stop_recording();
        }
    }

    /// Process one frame and return the display state after it
    pub fn process_frame(&mut self, frame: &Frame) -> DisplayState {
        let process_start = Instant::now();

        let ts = match self.timestamp_source {
            TimestampSource::Frame => frame.timestamp_ms,
            TimestampSource::WallClock => epoch_ms(),
        };
        let recording = self.session.begin_sample(ts);

        match Projection::for_frame(frame, self.view) {
            Some(projection) => {
                self.handle_faces(frame, &projection, ts, recording);
                self.handle_pose(frame, &projection, ts, recording);
            }
            None => {
                warn!(
                    width = frame.width,
                    height = frame.height,
                    view_width = self.view.width,
                    view_height = self.view.height,
                    "frame_skipped_degenerate_size"
                );
            }
        }

        self.publish();

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_frame_processed(latency_us);
        self.display
    }

    fn publish(&self) {
        let display = self.display;
        self.display_tx.send_if_modified(|current| {
            if *current == display {
                return false;
            }
            *current = display;
            true
        });
    }
}
