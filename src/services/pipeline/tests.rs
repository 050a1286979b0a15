//! Tests for the FramePipeline

use super::*;
use crate::domain::sample::CSV_HEADER;
use crate::domain::types::{
    CameraPosition, ContourType, DeviceOrientation, FaceLandmarks, HandSide, HandState, JointType,
    MouthState, Point, PoseLandmarks, RecordedDetections,
};
use crate::io::export::CsvExporter;
use crate::io::ingest_channel::{create_pipeline_channel, ControlCommand};
use crate::services::detector::ReplayDetector;
use std::fs;
use tempfile::{tempdir, TempDir};

/// Test harness keeping the export directory alive
struct TestPipeline {
    pipeline: FramePipeline<ReplayDetector>,
    dir: TempDir,
}

impl std::ops::Deref for TestPipeline {
    type Target = FramePipeline<ReplayDetector>;
    fn deref(&self) -> &Self::Target {
        &self.pipeline
    }
}

impl std::ops::DerefMut for TestPipeline {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pipeline
    }
}

fn create_test_pipeline() -> TestPipeline {
    create_test_pipeline_with_config(Config::default())
}

fn create_test_pipeline_with_config(config: Config) -> TestPipeline {
    let dir = tempdir().unwrap();
    let config = config.with_output_dir(dir.path());
    let metrics = Arc::new(Metrics::new());
    let session = RecordingSession::new(CsvExporter::new(config.output_dir()), metrics.clone());
    let pipeline = FramePipeline::new(
        &config,
        ReplayDetector::new(),
        session,
        MouthThreshold::new(config.mouth_threshold()),
        metrics,
    );
    TestPipeline { pipeline, dir }
}

/// Face whose lips sit at the given y values (frame pixels)
fn face(upper_y: f64, lower_y: f64) -> FaceLandmarks {
    let lip = |y: f64| [Point::new(180.0, y), Point::new(195.0, y), Point::new(210.0, y)];
    FaceLandmarks::new()
        .with_contour(ContourType::UpperLipBottom, &lip(upper_y))
        .with_contour(ContourType::LowerLipTop, &lip(lower_y))
}

/// Pose with (shoulder, elbow, wrist) y values per side
fn pose(left: (f64, f64, f64), right: (f64, f64, f64)) -> PoseLandmarks {
    let mut pose = PoseLandmarks::new();
    for (side, (s, e, w), x) in [(HandSide::Left, left, 120.0), (HandSide::Right, right, 270.0)] {
        let (sj, ej, wj) = JointType::arm(side);
        pose = pose
            .with_joint(sj, Point::new(x, s))
            .with_joint(ej, Point::new(x, e))
            .with_joint(wj, Point::new(x, w));
    }
    pose
}

/// Back-camera portrait frame matching the default view size, so projection is the identity
fn frame(ts: u64, faces: Vec<FaceLandmarks>, pose: Option<PoseLandmarks>) -> Frame {
    Frame::recorded(
        390,
        844,
        ts,
        CameraPosition::Back,
        DeviceOrientation::Portrait,
        RecordedDetections { faces, pose, ..Default::default() },
    )
}

fn full_frame(ts: u64) -> Frame {
    frame(ts, vec![face(400.0, 420.0)], Some(pose((300.0, 250.0, 320.0), (300.0, 340.0, 380.0))))
}

#[test]
fn test_mouth_threshold_boundary() {
    let mut p = create_test_pipeline();

    let display = p.process_frame(&frame(1, vec![face(400.0, 405.0)], None));
    assert_eq!(display.mouth, Some(MouthState::Closed));

    let display = p.process_frame(&frame(2, vec![face(400.0, 406.0)], None));
    assert_eq!(display.mouth, Some(MouthState::Open));
}

#[test]
fn test_hand_states_per_side() {
    let mut p = create_test_pipeline();
    let display = p.process_frame(&full_frame(1));
    assert_eq!(display.left_hand, Some(HandState::Up));
    assert_eq!(display.right_hand, Some(HandState::Down));

    // Wrist above the shoulder also counts as raised
    let display = p.process_frame(&frame(2, vec![], Some(pose((100.0, 105.0, 95.0), (100.0, 90.0, 110.0)))));
    assert_eq!(display.left_hand, Some(HandState::Up));
    assert_eq!(display.right_hand, Some(HandState::Up));
}

#[test]
fn test_empty_contour_keeps_previous_state() {
    let mut p = create_test_pipeline();
    p.start_recording();
    p.process_frame(&frame(1, vec![face(400.0, 430.0)], None));
    assert_eq!(p.display().mouth, Some(MouthState::Open));

    let broken = FaceLandmarks::new()
        .with_contour(ContourType::UpperLipBottom, &[])
        .with_contour(ContourType::LowerLipTop, &[Point::new(1.0, 1.0)]);
    let display = p.process_frame(&frame(2, vec![broken], None));
    assert_eq!(display.mouth, Some(MouthState::Open));
    assert_eq!(p.metrics.mouth_skipped(), 1);

    let samples = p.session.drain_and_clear();
    assert_eq!(samples.len(), 2);
    assert!(samples[0].mouth_openness.is_some());
    assert_eq!(samples[1].mouth_openness, None);
    assert_eq!(samples[1].mouth_movement, None);
}

#[test]
fn test_last_classified_face_wins() {
    let mut p = create_test_pipeline();

    let display = p.process_frame(&frame(1, vec![face(400.0, 440.0), face(400.0, 401.0)], None));
    assert_eq!(display.mouth, Some(MouthState::Closed));

    // A trailing face that cannot be classified does not override
    let unusable = FaceLandmarks::new();
    let display = p.process_frame(&frame(2, vec![face(400.0, 440.0), unusable], None));
    assert_eq!(display.mouth, Some(MouthState::Open));
}

#[test]
fn test_detector_error_keeps_previous_state() {
    let mut p = create_test_pipeline();
    p.process_frame(&full_frame(1));

    let failing = Frame::recorded(
        390,
        844,
        2,
        CameraPosition::Back,
        DeviceOrientation::Portrait,
        RecordedDetections {
            face_error: Some("face model unavailable".to_string()),
            pose_error: Some("pose model unavailable".to_string()),
            ..Default::default()
        },
    );
    let display = p.process_frame(&failing);
    assert_eq!(display.mouth, Some(MouthState::Open));
    assert_eq!(display.left_hand, Some(HandState::Up));
    assert_eq!(p.metrics.detector_errors(), 2);
}

#[test]
fn test_missing_joint_skips_hands() {
    let mut p = create_test_pipeline();
    let partial = PoseLandmarks::new().with_joint(JointType::LeftShoulder, Point::new(1.0, 1.0));
    let display = p.process_frame(&frame(1, vec![], Some(partial)));
    assert_eq!(display.left_hand, None);
    assert_eq!(p.metrics.hands_skipped(), 1);
}

#[test]
fn test_threshold_controls() {
    let mut p = create_test_pipeline();
    let wide = frame(1, vec![face(400.0, 410.0)], None);

    assert_eq!(p.process_frame(&wide).mouth, Some(MouthState::Open));

    p.handle_control(ControlCommand::SetMouthThreshold(10));
    assert_eq!(p.mouth_threshold(), 10);
    assert_eq!(p.process_frame(&wide).mouth, Some(MouthState::Closed));

    p.handle_control(ControlCommand::ResetMouthThreshold);
    assert_eq!(p.mouth_threshold(), 5);
    assert_eq!(p.process_frame(&wide).mouth, Some(MouthState::Open));
}

#[test]
fn test_frames_not_recorded_while_idle() {
    let mut p = create_test_pipeline();
    p.process_frame(&full_frame(1));
    assert_eq!(p.session.sample_count(), 0);
}

#[test]
fn test_recording_round_trip() {
    let mut p = create_test_pipeline();
    assert!(p.start_recording());

    p.process_frame(&full_frame(1000));
    p.process_frame(&frame(1001, vec![face(400.0, 402.0)], None));
    p.process_frame(&full_frame(1002));

    let report = p.stop_recording();
    assert_eq!(report.samples_total, 3);
    assert_eq!(report.rows_written, 2);
    assert_eq!(report.rows_incomplete, 1);

    let path = report.path().unwrap();
    assert_eq!(path, &p.dir.path().join("data0.csv"));
    let content = fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.split('\n').collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], CSV_HEADER);
    assert!(lines[1].starts_with("1000,20,1,"));
    assert!(lines[2].starts_with("1002,20,1,"));
    assert!(lines[1].ends_with(",1,270:300,270:380,270:340,0"));
}

#[test]
fn test_wall_clock_timestamps() {
    let config = Config::default().with_timestamp_source(TimestampSource::WallClock);
    let mut p = create_test_pipeline_with_config(config);
    p.start_recording();

    let before = epoch_ms();
    p.process_frame(&full_frame(7));
    let samples = p.session.drain_and_clear();
    assert_eq!(samples.len(), 1);
    assert!(samples[0].ts >= before);
}

#[test]
fn test_degenerate_frame_is_skipped() {
    let mut p = create_test_pipeline();
    p.start_recording();
    let mut empty = full_frame(1);
    empty.width = 0;

    let display = p.process_frame(&empty);
    assert_eq!(display, DisplayState::default());
    assert_eq!(p.stop_recording().rows_written, 0);
}

#[test]
fn test_subscriber_sees_changes() {
    let mut p = create_test_pipeline();
    let mut rx = p.subscribe();
    assert!(!rx.has_changed().unwrap());

    p.process_frame(&full_frame(1));
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().mouth, Some(MouthState::Open));

    // Same state again is not republished
    p.process_frame(&full_frame(2));
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_run_applies_controls_in_order() {
    let p = create_test_pipeline();
    let TestPipeline { mut pipeline, dir } = p;
    let metrics = pipeline.metrics.clone();
    let (sender, rx) = create_pipeline_channel(8, metrics);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = tokio::spawn(async move {
        pipeline.run(rx, shutdown_rx).await;
        pipeline
    });

    sender.start_recording().await.unwrap();
    sender.send_frame(full_frame(1000)).await.unwrap();
    sender.send_frame(full_frame(1001)).await.unwrap();
    let report = sender.stop_recording().await.unwrap();
    assert_eq!(report.rows_written, 2);
    assert_eq!(report.path().unwrap(), &dir.path().join("data0.csv"));

    drop(sender);
    let pipeline = worker.await.unwrap();
    assert!(!pipeline.session().is_recording());
}

#[tokio::test]
async fn test_shutdown_exports_active_recording() {
    let TestPipeline { mut pipeline, dir } = create_test_pipeline();
    let session = pipeline.session().clone();
    let (sender, rx) = create_pipeline_channel(8, pipeline.metrics.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    sender.start_recording().await.unwrap();
    sender.send_frame(full_frame(5)).await.unwrap();

    let worker = tokio::spawn(async move {
        pipeline.run(rx, shutdown_rx).await;
    });

    // Wait for the frame to be recorded before signalling shutdown
    while session.sample_count() == 0 {
        tokio::task::yield_now().await;
    }
    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();

    assert!(!session.is_recording());
    let content = fs::read_to_string(dir.path().join("data0.csv")).unwrap();
    assert_eq!(content.split('\n').count(), 2);
}
