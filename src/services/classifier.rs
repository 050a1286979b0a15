//! Mouth and hand state classification from projected landmarks

use crate::domain::types::{
    ContourType, FaceLandmarks, HandSide, HandState, JointType, MouthState, Point, PoseLandmarks,
};
use crate::services::projection::Projection;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_MOUTH_THRESHOLD: i64 = 5;

/// Runtime-adjustable mouth threshold, shared between the worker and controls.
///
/// No bounds are enforced: a negative value makes every face Open.
#[derive(Debug, Clone)]
pub struct MouthThreshold(Arc<AtomicI64>);

impl MouthThreshold {
    pub fn new(value: i64) -> Self {
        Self(Arc::new(AtomicI64::new(value)))
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: i64) {
        let previous = self.0.swap(value, Ordering::Relaxed);
        info!(previous = %previous, threshold = %value, "mouth_threshold_set");
    }

    /// Restore the default of 5
    pub fn reset(&self) {
        self.set(DEFAULT_MOUTH_THRESHOLD);
    }
}

impl Default for MouthThreshold {
    fn default() -> Self {
        Self::new(DEFAULT_MOUTH_THRESHOLD)
    }
}

/// Result of classifying one face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouthReading {
    pub upper_lip_y: f64,
    pub lower_lip_y: f64,
    /// Unrounded lip distance, recorded as-is
    pub openness: f64,
    pub state: MouthState,
}

/// Arithmetic mean of the y coordinates; `None` for an empty contour
pub fn mean_y(points: impl IntoIterator<Item = Point>) -> Option<f64> {
    let (sum, count) = points.into_iter().fold((0.0, 0usize), |(s, n), p| (s + p.y, n + 1));
    if count == 0 {
        return None;
    }
    Some(sum / count as f64)
}

/// Classify a mouth from already projected lip contours.
///
/// The state compares rounded means; the openness keeps full precision. The two
/// can disagree near the boundary.
pub fn classify_mouth(upper: &[Point], lower: &[Point], threshold: i64) -> Option<MouthReading> {
    let upper_lip_y = mean_y(upper.iter().copied())?;
    let lower_lip_y = mean_y(lower.iter().copied())?;

    let openness = (lower_lip_y - upper_lip_y).abs();
    // Compared in f64; integer casts saturate for extreme coordinates
    let rounded_diff = (lower_lip_y.round() - upper_lip_y.round()).abs();
    let state =
        if rounded_diff <= threshold as f64 { MouthState::Closed } else { MouthState::Open };

    Some(MouthReading { upper_lip_y, lower_lip_y, openness, state })
}

/// Project a face's lip contours and classify it; `None` if a lip contour is missing or empty
pub fn classify_face(
    face: &FaceLandmarks,
    projection: &Projection,
    threshold: i64,
) -> Option<MouthReading> {
    let upper = face.contour(ContourType::UpperLipBottom).filter(|c| !c.is_empty());
    let lower = face.contour(ContourType::LowerLipTop).filter(|c| !c.is_empty());

    let (Some(upper), Some(lower)) = (upper, lower) else {
        debug!(
            has_upper = upper.is_some(),
            has_lower = lower.is_some(),
            "mouth_skipped_missing_contour"
        );
        return None;
    };

    let upper: Vec<Point> = upper.iter().map(|&p| projection.project(p)).collect();
    let lower: Vec<Point> = lower.iter().map(|&p| projection.project(p)).collect();
    classify_mouth(&upper, &lower, threshold)
}

/// Up when the elbow or the wrist is above the shoulder (smaller y)
#[inline]
pub fn classify_hand(shoulder: Point, elbow: Point, wrist: Point) -> HandState {
    if elbow.y < shoulder.y || wrist.y < shoulder.y {
        HandState::Up
    } else {
        HandState::Down
    }
}

/// One side's projected joints plus its classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmReading {
    pub side: HandSide,
    pub shoulder: Point,
    pub elbow: Point,
    pub wrist: Point,
    pub state: HandState,
}

fn read_arm(pose: &PoseLandmarks, projection: &Projection, side: HandSide) -> Option<ArmReading> {
    let (shoulder, elbow, wrist) = JointType::arm(side);
    let shoulder = projection.project(pose.joint(shoulder)?.position);
    let elbow = projection.project(pose.joint(elbow)?.position);
    let wrist = projection.project(pose.joint(wrist)?.position);

    Some(ArmReading { side, shoulder, elbow, wrist, state: classify_hand(shoulder, elbow, wrist) })
}

/// Classify both arms, left first. `None` when any of the six arm joints is missing.
pub fn classify_arms(pose: &PoseLandmarks, projection: &Projection) -> Option<[ArmReading; 2]> {
    let left = read_arm(pose, projection, HandSide::Left);
    let right = read_arm(pose, projection, HandSide::Right);

    match (left, right) {
        (Some(left), Some(right)) => Some([left, right]),
        _ => {
            debug!(joints = pose.len(), "hands_skipped_missing_joint");
            None
        }
    }
}
