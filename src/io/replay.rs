//! Replay of recorded detection streams (JSON Lines)
//!
//! Stands in for the live camera + vision library. Each line is one record:
//! a frame carrying its detections, or a control (start, stop, threshold).
//! Blank lines and `#` comments are skipped; malformed lines are logged and
//! skipped.

use crate::domain::types::{
    CameraPosition, ContourType, DeviceOrientation, FaceLandmarks, Frame, JointType, Point,
    PoseJoint, PoseLandmarks, RecordedDetections,
};
use crate::io::ingest_channel::{ControlCommand, FrameSender, Offer, PipelineInput};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Largest pause inserted between two paced frames
const MAX_PACING_GAP: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to open replay file {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },

    #[error("Failed to read replay file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Malformed record on line {line}: {source}")]
    Parse { line: usize, source: serde_json::Error },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawRecord {
    Frame(RawFrame),
    Start,
    Stop,
    Threshold { value: i64 },
    ThresholdReset,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    ts: u64,
    width: u32,
    height: u32,
    #[serde(default)]
    camera: Option<CameraPosition>,
    #[serde(default)]
    orientation: Option<DeviceOrientation>,
    #[serde(default)]
    faces: Vec<RawFace>,
    #[serde(default)]
    pose: Option<FxHashMap<String, RawJoint>>,
    #[serde(default)]
    face_error: Option<String>,
    #[serde(default)]
    pose_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFace {
    #[serde(default)]
    contours: FxHashMap<String, Vec<Point>>,
}

#[derive(Debug, Deserialize)]
struct RawJoint {
    x: f64,
    y: f64,
    #[serde(default)]
    z: Option<f64>,
    #[serde(default = "default_likelihood")]
    likelihood: f32,
}

fn default_likelihood() -> f32 {
    1.0
}

impl RawFace {
    fn into_landmarks(self) -> FaceLandmarks {
        let mut face = FaceLandmarks::new();
        for (name, points) in self.contours {
            match ContourType::from_name(&name) {
                Some(contour) => face.insert_contour(contour, points.into_iter().collect()),
                None => debug!(contour = %name, "unknown_contour_ignored"),
            }
        }
        face
    }
}

fn into_pose(raw: FxHashMap<String, RawJoint>) -> PoseLandmarks {
    let mut pose = PoseLandmarks::new();
    for (name, joint) in raw {
        match JointType::from_name(&name) {
            Some(joint_type) => pose.insert_joint(
                joint_type,
                PoseJoint {
                    position: Point::new(joint.x, joint.y),
                    z: joint.z,
                    in_frame_likelihood: joint.likelihood,
                },
            ),
            None => debug!(joint = %name, "unknown_joint_ignored"),
        }
    }
    pose
}

impl RawFrame {
    fn into_frame(self, defaults: &ReplayOptions) -> Frame {
        let detections = RecordedDetections {
            faces: self.faces.into_iter().map(RawFace::into_landmarks).collect(),
            pose: self.pose.map(into_pose),
            face_error: self.face_error,
            pose_error: self.pose_error,
        };
        Frame::recorded(
            self.width,
            self.height,
            self.ts,
            self.camera.unwrap_or(defaults.camera),
            self.orientation.unwrap_or(defaults.orientation),
            detections,
        )
    }
}

/// How a replay is fed into the pipeline
#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Await queue space for every frame instead of dropping while the worker is busy
    pub lossless: bool,
    /// Sleep between frames according to their timestamps (capped)
    pub paced: bool,
    /// Used when a frame record omits `camera`
    pub camera: CameraPosition,
    /// Used when a frame record omits `orientation`
    pub orientation: DeviceOrientation,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            lossless: true,
            paced: false,
            camera: CameraPosition::default(),
            orientation: DeviceOrientation::default(),
        }
    }
}

/// Parse one line. `Ok(None)` for blank lines and comments.
pub fn parse_line(
    line: &str,
    line_no: usize,
    options: &ReplayOptions,
) -> Result<Option<PipelineInput>, ReplayError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let record: RawRecord = serde_json::from_str(trimmed)
        .map_err(|source| ReplayError::Parse { line: line_no, source })?;

    let input = match record {
        RawRecord::Frame(raw) => PipelineInput::Frame(raw.into_frame(options)),
        RawRecord::Start => PipelineInput::Control(ControlCommand::StartRecording),
        RawRecord::Stop => PipelineInput::Control(ControlCommand::StopRecording { reply: None }),
        RawRecord::Threshold { value } => {
            PipelineInput::Control(ControlCommand::SetMouthThreshold(value))
        }
        RawRecord::ThresholdReset => PipelineInput::Control(ControlCommand::ResetMouthThreshold),
    };
    Ok(Some(input))
}

/// Counters for one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: usize,
    pub frames_sent: usize,
    pub frames_dropped: usize,
    pub controls_sent: usize,
    pub malformed: usize,
}

/// Feed a replay file into the pipeline channel until EOF, shutdown, or channel close
pub async fn run_replay(
    path: &Path,
    sender: &FrameSender,
    options: ReplayOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ReplayStats, ReplayError> {
    let file = File::open(path)
        .await
        .map_err(|source| ReplayError::Open { path: path.to_path_buf(), source })?;
    let mut lines = BufReader::new(file).lines();

    info!(path = %path.display(), lossless = options.lossless, paced = options.paced, "replay_started");

    let mut stats = ReplayStats::default();
    let mut last_frame_ts: Option<u64> = None;

    loop {
        if *shutdown.borrow() {
            info!("replay_shutdown");
            break;
        }

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(source) => return Err(ReplayError::Read { path: path.to_path_buf(), source }),
        };
        stats.lines += 1;

        let input = match parse_line(&line, stats.lines, &options) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(e) => {
                stats.malformed += 1;
                warn!(error = %e, "replay_line_skipped");
                continue;
            }
        };

        let closed = match input {
            PipelineInput::Frame(frame) => {
                if options.paced {
                    if let Some(prev) = last_frame_ts {
                        let gap =
                            Duration::from_millis(frame.timestamp_ms.saturating_sub(prev)).min(MAX_PACING_GAP);
                        tokio::select! {
                            _ = tokio::time::sleep(gap) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                }
                last_frame_ts = Some(frame.timestamp_ms);

                if options.lossless {
                    let closed = sender.send_frame(frame).await.is_err();
                    if !closed {
                        stats.frames_sent += 1;
                    }
                    closed
                } else {
                    match sender.offer_frame(frame) {
                        Offer::Queued => {
                            stats.frames_sent += 1;
                            false
                        }
                        Offer::Dropped => {
                            stats.frames_dropped += 1;
                            false
                        }
                        Offer::Closed => true,
                    }
                }
            }
            PipelineInput::Control(command) => {
                debug!(command = ?command, "replay_control");
                let closed = sender.send_control(command).await.is_err();
                if !closed {
                    stats.controls_sent += 1;
                }
                closed
            }
        };

        if closed {
            warn!("replay_pipeline_closed");
            break;
        }
    }

    info!(
        lines = stats.lines,
        frames_sent = stats.frames_sent,
        frames_dropped = stats.frames_dropped,
        controls_sent = stats.controls_sent,
        malformed = stats.malformed,
        "replay_finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::FrameImage;
    use crate::infra::metrics::Metrics;
    use crate::io::ingest_channel::create_pipeline_channel;
    use std::io::Write;
    use std::sync::Arc;

    const FRAME_LINE: &str = r#"{"type":"frame","ts":1000,"width":480,"height":640,"camera":"back","orientation":"landscape_left","faces":[{"contours":{"upper_lip_bottom":[[10,20],[12,21]],"lower_lip_top":[[10,30]],"nose_bridge":[[1,1]],"chin":[[0,0]]}}],"pose":{"left_shoulder":{"x":1.0,"y":2.0,"likelihood":0.9},"left_wrist":{"x":3.0,"y":4.0,"z":-0.5},"tail":{"x":0,"y":0}},"face_error":null,"pose_error":"timeout"}"#;

    #[test]
    fn test_parse_frame_record() {
        let input = parse_line(FRAME_LINE, 1, &ReplayOptions::default()).unwrap().unwrap();
        let PipelineInput::Frame(frame) = input else {
            panic!("expected a frame");
        };
        assert_eq!(frame.timestamp_ms, 1000);
        assert_eq!((frame.width, frame.height), (480, 640));
        assert_eq!(frame.camera, CameraPosition::Back);
        assert_eq!(frame.orientation, DeviceOrientation::LandscapeLeft);

        let FrameImage::Recorded(rec) = frame.image else {
            panic!("expected recorded detections");
        };
        assert_eq!(rec.faces.len(), 1);
        assert_eq!(rec.faces[0].contour(ContourType::UpperLipBottom).unwrap().len(), 2);
        assert_eq!(rec.faces[0].contour(ContourType::LowerLipTop).unwrap()[0], Point::new(10.0, 30.0));

        let pose = rec.pose.as_ref().unwrap();
        assert_eq!(pose.len(), 2);
        let shoulder = pose.joint(JointType::LeftShoulder).unwrap();
        assert_eq!(shoulder.in_frame_likelihood, 0.9);
        assert_eq!(pose.joint(JointType::LeftWrist).unwrap().z, Some(-0.5));
        assert_eq!(rec.face_error, None);
        assert_eq!(rec.pose_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_frame_defaults_from_options() {
        let options = ReplayOptions {
            camera: CameraPosition::Back,
            orientation: DeviceOrientation::LandscapeRight,
            ..Default::default()
        };
        let line = r#"{"type":"frame","ts":1,"width":2,"height":2}"#;
        let Some(PipelineInput::Frame(frame)) = parse_line(line, 1, &options).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.camera, CameraPosition::Back);
        assert_eq!(frame.orientation, DeviceOrientation::LandscapeRight);
    }

    #[test]
    fn test_parse_controls() {
        let options = ReplayOptions::default();
        assert!(matches!(
            parse_line(r#"{"type":"start"}"#, 1, &options).unwrap(),
            Some(PipelineInput::Control(ControlCommand::StartRecording))
        ));
        assert!(matches!(
            parse_line(r#"{"type":"stop"}"#, 1, &options).unwrap(),
            Some(PipelineInput::Control(ControlCommand::StopRecording { reply: None }))
        ));
        assert!(matches!(
            parse_line(r#"{"type":"threshold","value":-3}"#, 1, &options).unwrap(),
            Some(PipelineInput::Control(ControlCommand::SetMouthThreshold(-3)))
        ));
        assert!(matches!(
            parse_line(r#"{"type":"threshold_reset"}"#, 1, &options).unwrap(),
            Some(PipelineInput::Control(ControlCommand::ResetMouthThreshold))
        ));
    }

    #[test]
    fn test_skip_blank_and_comments() {
        let options = ReplayOptions::default();
        assert!(parse_line("", 1, &options).unwrap().is_none());
        assert!(parse_line("   ", 2, &options).unwrap().is_none());
        assert!(parse_line("# session recorded in the lab", 3, &options).unwrap().is_none());
    }

    #[test]
    fn test_malformed_lines() {
        let options = ReplayOptions::default();
        assert!(matches!(
            parse_line("{not json", 4, &options),
            Err(ReplayError::Parse { line: 4, .. })
        ));
        assert!(parse_line(r#"{"type":"rewind"}"#, 5, &options).is_err());
        assert!(parse_line(r#"{"type":"frame","ts":1}"#, 6, &options).is_err());
    }

    #[tokio::test]
    async fn test_run_replay_counts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header").unwrap();
        writeln!(file, r#"{{"type":"start"}}"#).unwrap();
        writeln!(file, "{FRAME_LINE}").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, r#"{{"type":"stop"}}"#).unwrap();
        file.flush().unwrap();

        let (sender, mut rx) = create_pipeline_channel(16, Arc::new(Metrics::new()));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = run_replay(file.path(), &sender, ReplayOptions::default(), shutdown_rx)
            .await
            .unwrap();

        assert_eq!(stats.lines, 5);
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.controls_sent, 2);
        assert_eq!(stats.malformed, 1);

        assert!(matches!(rx.recv().await, Some(PipelineInput::Control(ControlCommand::StartRecording))));
        assert!(matches!(rx.recv().await, Some(PipelineInput::Frame(_))));
        assert!(matches!(
            rx.recv().await,
            Some(PipelineInput::Control(ControlCommand::StopRecording { .. }))
        ));
    }

    #[tokio::test]
    async fn test_run_replay_missing_file() {
        let (sender, _rx) = create_pipeline_channel(1, Arc::new(Metrics::new()));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let err = run_replay(Path::new("/nonexistent/replay.jsonl"), &sender, ReplayOptions::default(), shutdown_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::Open { .. }));
    }
}
