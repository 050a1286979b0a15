//! Vision detector interface
//!
//! Face and pose detection are external collaborators. The pipeline talks to
//! them through `VisionDetector`; `ReplayDetector` serves detections that were
//! captured ahead of time and travel inside the frame.

use crate::domain::types::{FaceLandmarks, Frame, FrameImage, PoseLandmarks};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectorError {
    #[error("Frame carries raw pixels but no detector backend is available")]
    PixelsUnsupported,

    #[error("Face detection failed: {0}")]
    FaceDetectionFailed(String),

    #[error("Pose detection failed: {0}")]
    PoseDetectionFailed(String),
}

pub type DetectorResult<T> = Result<T, DetectorError>;

/// Face and pose landmark extraction. One instance is created and reused for every frame.
pub trait VisionDetector: Send + Sync {
    /// Zero or more faces, in detection order
    fn detect_faces(&self, frame: &Frame) -> DetectorResult<Vec<FaceLandmarks>>;

    /// At most one pose
    fn detect_pose(&self, frame: &Frame) -> DetectorResult<Option<PoseLandmarks>>;
}

/// Returns the detections recorded in a replayed frame
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayDetector;

impl ReplayDetector {
    pub fn new() -> Self {
        Self
    }
}

impl VisionDetector for ReplayDetector {
    fn detect_faces(&self, frame: &Frame) -> DetectorResult<Vec<FaceLandmarks>> {
        match &frame.image {
            FrameImage::Recorded(rec) => match &rec.face_error {
                Some(msg) => Err(DetectorError::FaceDetectionFailed(msg.clone())),
                None => Ok(rec.faces.clone()),
            },
            FrameImage::Pixels(_) => Err(DetectorError::PixelsUnsupported),
        }
    }

    fn detect_pose(&self, frame: &Frame) -> DetectorResult<Option<PoseLandmarks>> {
        match &frame.image {
            FrameImage::Recorded(rec) => match &rec.pose_error {
                Some(msg) => Err(DetectorError::PoseDetectionFailed(msg.clone())),
                None => Ok(rec.pose.clone()),
            },
            FrameImage::Pixels(_) => Err(DetectorError::PixelsUnsupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{
        CameraPosition, ContourType, DeviceOrientation, JointType, Point, RecordedDetections,
    };
    use bytes::Bytes;

    fn frame(detections: RecordedDetections) -> Frame {
        Frame::recorded(390, 844, 1000, CameraPosition::Front, DeviceOrientation::Portrait, detections)
    }

    #[test]
    fn test_replay_returns_recorded_detections() {
        let face = FaceLandmarks::new().with_contour(ContourType::UpperLipBottom, &[Point::new(1.0, 2.0)]);
        let pose = PoseLandmarks::new().with_joint(JointType::LeftWrist, Point::new(3.0, 4.0));
        let f = frame(RecordedDetections {
            faces: vec![face.clone()],
            pose: Some(pose.clone()),
            ..Default::default()
        });

        let detector = ReplayDetector::new();
        assert_eq!(detector.detect_faces(&f).unwrap(), vec![face]);
        assert_eq!(detector.detect_pose(&f).unwrap(), Some(pose));
    }

    #[test]
    fn test_replay_surfaces_recorded_errors() {
        let f = frame(RecordedDetections {
            face_error: Some("model busy".to_string()),
            ..Default::default()
        });

        let detector = ReplayDetector::new();
        assert_eq!(
            detector.detect_faces(&f),
            Err(DetectorError::FaceDetectionFailed("model busy".to_string()))
        );
        // Pose side is independent
        assert_eq!(detector.detect_pose(&f), Ok(None));
    }

    #[test]
    fn test_pixel_frames_unsupported() {
        let f = Frame {
            width: 2,
            height: 2,
            timestamp_ms: 1,
            camera: CameraPosition::Back,
            orientation: DeviceOrientation::Portrait,
            image: FrameImage::Pixels(Bytes::from_static(&[0; 16])),
        };
        let detector = ReplayDetector::new();
        assert_eq!(detector.detect_faces(&f), Err(DetectorError::PixelsUnsupported));
        assert_eq!(detector.detect_pose(&f), Err(DetectorError::PixelsUnsupported));
    }
}
