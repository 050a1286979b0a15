//! Detection and control handlers for the FramePipeline

use super::FramePipeline;
use crate::domain::sample::SampleField;
use crate::domain::types::Frame;
use crate::io::ingest_channel::ControlCommand;
use crate::services::classifier::{classify_arms, classify_face, MouthReading};
use crate::services::detector::VisionDetector;
use crate::services::projection::Projection;
use crate::services::session::ExportReport;
use tracing::{debug, warn};

impl<D: VisionDetector> FramePipeline<D> {
    /// Classify every face in detection order; the last classified face wins.
    pub(crate) fn handle_faces(
        &mut self,
        frame: &Frame,
        projection: &Projection,
        ts: u64,
        recording: bool,
    ) {
        let faces = match self.detector.detect_faces(frame) {
            Ok(faces) => faces,
            Err(e) => {
                self.metrics.record_detector_error();
                warn!(ts = ts, error = %e, "face_detection_failed");
                return;
            }
        };

        let threshold = self.threshold.get();
        let mut last: Option<MouthReading> = None;
        for face in &faces {
            let reading = classify_face(face, projection, threshold);
            self.metrics.record_mouth(reading.is_some());
            if reading.is_some() {
                last = reading;
            }
        }

        let Some(reading) = last else {
            return;
        };

        debug!(
            ts = ts,
            faces = faces.len(),
            openness = reading.openness,
            state = reading.state.as_str(),
            "mouth_classified"
        );
        self.display.mouth = Some(reading.state);

        if recording {
            self.session.update_fields(
                ts,
                &[SampleField::MouthOpenness(reading.openness), SampleField::MouthMovement(reading.state)],
            );
        }
    }

    pub(crate) fn handle_pose(
        &mut self,
        frame: &Frame,
        projection: &Projection,
        ts: u64,
        recording: bool,
    ) {
        let pose = match self.detector.detect_pose(frame) {
            Ok(Some(pose)) => pose,
            Ok(None) => return,
            Err(e) => {
                self.metrics.record_detector_error();
                warn!(ts = ts, error = %e, "pose_detection_failed");
                return;
            }
        };

        let arms = classify_arms(&pose, projection);
        self.metrics.record_hands(arms.is_some());
        let Some(arms) = arms else {
            return;
        };

        let mut fields = Vec::with_capacity(8);
        for arm in arms {
            self.display.set_hand(arm.side, arm.state);
            fields.extend([
                SampleField::Shoulder(arm.side, arm.shoulder),
                SampleField::Wrist(arm.side, arm.wrist),
                SampleField::Elbow(arm.side, arm.elbow),
                SampleField::HandMovement(arm.side, arm.state),
            ]);
        }

        if recording {
            self.session.update_fields(ts, &fields);
        }
    }

    pub fn handle_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::StartRecording => {
                self.start_recording();
            }
            ControlCommand::StopRecording { reply } => {
                let report = self.stop_recording();
                if let Some(reply) = reply {
                    // Caller may have stopped waiting
                    let _ = reply.send(report);
                }
            }
            ControlCommand::SetMouthThreshold(value) => self.set_mouth_threshold(value),
            ControlCommand::ResetMouthThreshold => self.reset_mouth_threshold(),
        }
    }

    pub fn start_recording(&self) -> bool {
        self.session.start()
    }

    pub fn stop_recording(&self) -> ExportReport {
        self.session.stop()
    }

    pub fn set_mouth_threshold(&self, value: i64) {
        self.threshold.set(value);
    }

    pub fn mouth_threshold(&self) -> i64 {
        self.threshold.get()
    }

    pub fn reset_mouth_threshold(&self) {
        self.threshold.reset();
    }
}
