//! Shared types for the signal recorder

use bytes::Bytes;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A 2-D point. Frame-pixel coordinates before projection, view coordinates after.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from(xy: [f64; 2]) -> Self {
        Self { x: xy[0], y: xy[1] }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Which physical camera produced the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    #[default]
    Front,
    Back,
}

/// Physical device orientation at capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
    Unknown,
}

impl DeviceOrientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceOrientation::Portrait => "portrait",
            DeviceOrientation::PortraitUpsideDown => "portrait_upside_down",
            DeviceOrientation::LandscapeLeft => "landscape_left",
            DeviceOrientation::LandscapeRight => "landscape_right",
            DeviceOrientation::FaceUp => "face_up",
            DeviceOrientation::FaceDown => "face_down",
            DeviceOrientation::Unknown => "unknown",
        }
    }
}

/// Face contour names reported by the vision library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContourType {
    Face,
    LeftEyebrowTop,
    LeftEyebrowBottom,
    RightEyebrowTop,
    RightEyebrowBottom,
    LeftEye,
    RightEye,
    UpperLipTop,
    UpperLipBottom,
    LowerLipTop,
    LowerLipBottom,
    NoseBridge,
    NoseBottom,
    LeftCheek,
    RightCheek,
}

impl ContourType {
    /// Parse a snake_case contour name; unknown names yield `None`
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "face" => ContourType::Face,
            "left_eyebrow_top" => ContourType::LeftEyebrowTop,
            "left_eyebrow_bottom" => ContourType::LeftEyebrowBottom,
            "right_eyebrow_top" => ContourType::RightEyebrowTop,
            "right_eyebrow_bottom" => ContourType::RightEyebrowBottom,
            "left_eye" => ContourType::LeftEye,
            "right_eye" => ContourType::RightEye,
            "upper_lip_top" => ContourType::UpperLipTop,
            "upper_lip_bottom" => ContourType::UpperLipBottom,
            "lower_lip_top" => ContourType::LowerLipTop,
            "lower_lip_bottom" => ContourType::LowerLipBottom,
            "nose_bridge" => ContourType::NoseBridge,
            "nose_bottom" => ContourType::NoseBottom,
            "left_cheek" => ContourType::LeftCheek,
            "right_cheek" => ContourType::RightCheek,
            _ => return None,
        })
    }
}

/// Contour points; lip contours carry 9-11 points so they stay inline
pub type Contour = SmallVec<[Point; 16]>;

/// One detected face
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceLandmarks {
    contours: FxHashMap<ContourType, Contour>,
}

impl FaceLandmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contour(mut self, contour_type: ContourType, points: &[Point]) -> Self {
        self.insert_contour(contour_type, points.iter().copied().collect());
        self
    }

    pub fn insert_contour(&mut self, contour_type: ContourType, points: Contour) {
        self.contours.insert(contour_type, points);
    }

    /// Points of a contour, if the detector reported it
    pub fn contour(&self, contour_type: ContourType) -> Option<&[Point]> {
        self.contours.get(&contour_type).map(|c| c.as_slice())
    }
}

/// Pose landmark names (33-point body model)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinkyFinger,
    RightPinkyFinger,
    LeftIndexFinger,
    RightIndexFinger,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftToe,
    RightToe,
}

impl JointType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "nose" => JointType::Nose,
            "left_eye_inner" => JointType::LeftEyeInner,
            "left_eye" => JointType::LeftEye,
            "left_eye_outer" => JointType::LeftEyeOuter,
            "right_eye_inner" => JointType::RightEyeInner,
            "right_eye" => JointType::RightEye,
            "right_eye_outer" => JointType::RightEyeOuter,
            "left_ear" => JointType::LeftEar,
            "right_ear" => JointType::RightEar,
            "mouth_left" => JointType::MouthLeft,
            "mouth_right" => JointType::MouthRight,
            "left_shoulder" => JointType::LeftShoulder,
            "right_shoulder" => JointType::RightShoulder,
            "left_elbow" => JointType::LeftElbow,
            "right_elbow" => JointType::RightElbow,
            "left_wrist" => JointType::LeftWrist,
            "right_wrist" => JointType::RightWrist,
            "left_pinky_finger" => JointType::LeftPinkyFinger,
            "right_pinky_finger" => JointType::RightPinkyFinger,
            "left_index_finger" => JointType::LeftIndexFinger,
            "right_index_finger" => JointType::RightIndexFinger,
            "left_thumb" => JointType::LeftThumb,
            "right_thumb" => JointType::RightThumb,
            "left_hip" => JointType::LeftHip,
            "right_hip" => JointType::RightHip,
            "left_knee" => JointType::LeftKnee,
            "right_knee" => JointType::RightKnee,
            "left_ankle" => JointType::LeftAnkle,
            "right_ankle" => JointType::RightAnkle,
            "left_heel" => JointType::LeftHeel,
            "right_heel" => JointType::RightHeel,
            "left_toe" => JointType::LeftToe,
            "right_toe" => JointType::RightToe,
            _ => return None,
        })
    }

    /// Shoulder, elbow and wrist joints for one side
    pub fn arm(side: HandSide) -> (JointType, JointType, JointType) {
        match side {
            HandSide::Left => (JointType::LeftShoulder, JointType::LeftElbow, JointType::LeftWrist),
            HandSide::Right => {
                (JointType::RightShoulder, JointType::RightElbow, JointType::RightWrist)
            }
        }
    }
}

/// A single pose landmark
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseJoint {
    pub position: Point,
    /// Depth relative to the hips, when the detector provides it
    pub z: Option<f64>,
    /// Detector confidence; never consulted by the classifiers
    pub in_frame_likelihood: f32,
}

/// The single detected pose of a frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseLandmarks {
    joints: FxHashMap<JointType, PoseJoint>,
}

impl PoseLandmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_joint(mut self, joint: JointType, position: Point) -> Self {
        self.insert_joint(joint, PoseJoint { position, z: None, in_frame_likelihood: 1.0 });
        self
    }

    pub fn insert_joint(&mut self, joint: JointType, value: PoseJoint) {
        self.joints.insert(joint, value);
    }

    pub fn joint(&self, joint: JointType) -> Option<&PoseJoint> {
        self.joints.get(&joint)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

/// Detector output captured ahead of time and carried inside a replayed frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedDetections {
    pub faces: Vec<FaceLandmarks>,
    pub pose: Option<PoseLandmarks>,
    /// Set when the face detector failed on this frame
    pub face_error: Option<String>,
    /// Set when the pose detector failed on this frame
    pub pose_error: Option<String>,
}

/// Image content of a frame
#[derive(Debug, Clone)]
pub enum FrameImage {
    /// Raw pixel buffer from a live camera
    Pixels(Bytes),
    /// Detections recorded from an earlier run
    Recorded(Box<RecordedDetections>),
}

/// One camera frame handed to the pipeline
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Capture timestamp, epoch milliseconds
    pub timestamp_ms: u64,
    pub camera: CameraPosition,
    pub orientation: DeviceOrientation,
    pub image: FrameImage,
}

impl Frame {
    /// Build a frame carrying pre-recorded detections
    pub fn recorded(
        width: u32,
        height: u32,
        timestamp_ms: u64,
        camera: CameraPosition,
        orientation: DeviceOrientation,
        detections: RecordedDetections,
    ) -> Self {
        Self {
            width,
            height,
            timestamp_ms,
            camera,
            orientation,
            image: FrameImage::Recorded(Box::new(detections)),
        }
    }
}

/// Mouth classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouthState {
    Open,
    Closed,
}

impl MouthState {
    /// Label shown on screen
    pub fn as_str(&self) -> &'static str {
        match self {
            MouthState::Open => "Opened",
            MouthState::Closed => "Closed",
        }
    }

    /// Recorded movement flag
    #[inline]
    pub fn as_flag(&self) -> u8 {
        match self {
            MouthState::Open => 1,
            MouthState::Closed => 0,
        }
    }
}

/// Hand classification for one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandState {
    Up,
    Down,
}

impl HandState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandState::Up => "Up",
            HandState::Down => "Down",
        }
    }

    #[inline]
    pub fn as_flag(&self) -> u8 {
        match self {
            HandState::Up => 1,
            HandState::Down => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    pub const BOTH: [HandSide; 2] = [HandSide::Left, HandSide::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandSide::Left => "left",
            HandSide::Right => "right",
        }
    }
}

/// What the UI should show. A field keeps its last value until a frame produces a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DisplayState {
    pub mouth: Option<MouthState>,
    pub left_hand: Option<HandState>,
    pub right_hand: Option<HandState>,
}

impl DisplayState {
    pub fn hand(&self, side: HandSide) -> Option<HandState> {
        match side {
            HandSide::Left => self.left_hand,
            HandSide::Right => self.right_hand,
        }
    }

    pub fn set_hand(&mut self, side: HandSide, state: HandState) {
        match side {
            HandSide::Left => self.left_hand = Some(state),
            HandSide::Right => self.right_hand = Some(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contour_type_from_name() {
        assert_eq!(ContourType::from_name("upper_lip_bottom"), Some(ContourType::UpperLipBottom));
        assert_eq!(ContourType::from_name("lower_lip_top"), Some(ContourType::LowerLipTop));
        assert_eq!(ContourType::from_name("chin"), None);
    }

    #[test]
    fn test_joint_arm_mapping() {
        assert_eq!(
            JointType::arm(HandSide::Right),
            (JointType::RightShoulder, JointType::RightElbow, JointType::RightWrist)
        );
        assert_eq!(JointType::from_name("left_wrist"), Some(JointType::LeftWrist));
    }

    #[test]
    fn test_point_serde_as_pair() {
        let p: Point = serde_json::from_str("[1.5, 2.0]").unwrap();
        assert_eq!(p, Point::new(1.5, 2.0));
        assert_eq!(serde_json::to_string(&p).unwrap(), "[1.5,2.0]");
    }

    #[test]
    fn test_display_state_keeps_other_side() {
        let mut display = DisplayState::default();
        display.set_hand(HandSide::Left, HandState::Up);
        assert_eq!(display.hand(HandSide::Left), Some(HandState::Up));
        assert_eq!(display.hand(HandSide::Right), None);
        assert_eq!(display.mouth, None);
    }
}
