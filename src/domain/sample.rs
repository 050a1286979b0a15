//! Recorded sample model - one row of derived signals per frame timestamp

use crate::domain::types::{HandSide, HandState, MouthState, Point};
use std::time::{SystemTime, UNIX_EPOCH};

/// Header line of every export
pub const CSV_HEADER: &str = "Timestamp,Mouth Distance of Opening,Mouth Movement,\
Left Shoulder Coordinate,Left Wrist Coordinate,Left Elbow Coordinate,Left Hand Movement,\
Right Shoulder Coordinate,Right Wrist Coordinate,Right Elbow Coordinate,Right Hand Movement";

/// Significant digits used when writing floats
pub const SIGNIFICANT_DIGITS: i32 = 6;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Format a float with at most six significant digits, trailing zeros trimmed
pub fn format_decimal(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (SIGNIFICANT_DIGITS - 1 - magnitude).max(0) as usize;
    let formatted = format!("{:.*}", decimals, value);

    if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        formatted
    }
}

/// `x:y` coordinate cell
pub fn format_coordinate(point: Point) -> String {
    format!("{}:{}", format_decimal(point.x), format_decimal(point.y))
}

/// One writable field of a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleField {
    MouthOpenness(f64),
    MouthMovement(MouthState),
    Shoulder(HandSide, Point),
    Wrist(HandSide, Point),
    Elbow(HandSide, Point),
    HandMovement(HandSide, HandState),
}

/// Per-side arm fields
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArmFields {
    pub shoulder: Option<Point>,
    pub wrist: Option<Point>,
    pub elbow: Option<Point>,
    pub movement: Option<HandState>,
}

impl ArmFields {
    fn is_complete(&self) -> bool {
        self.shoulder.is_some()
            && self.wrist.is_some()
            && self.elbow.is_some()
            && self.movement.is_some()
    }
}

/// A recorded frame; fields stay unset until a classifier produces them
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub ts: u64,
    pub mouth_openness: Option<f64>,
    pub mouth_movement: Option<MouthState>,
    pub left: ArmFields,
    pub right: ArmFields,
}

impl Sample {
    pub fn new(ts: u64) -> Self {
        Self {
            ts,
            mouth_openness: None,
            mouth_movement: None,
            left: ArmFields::default(),
            right: ArmFields::default(),
        }
    }

    fn arm_mut(&mut self, side: HandSide) -> &mut ArmFields {
        match side {
            HandSide::Left => &mut self.left,
            HandSide::Right => &mut self.right,
        }
    }

    /// Write one field, overwriting any earlier value
    pub fn apply(&mut self, field: SampleField) {
        match field {
            SampleField::MouthOpenness(v) => self.mouth_openness = Some(v),
            SampleField::MouthMovement(state) => self.mouth_movement = Some(state),
            SampleField::Shoulder(side, p) => self.arm_mut(side).shoulder = Some(p),
            SampleField::Wrist(side, p) => self.arm_mut(side).wrist = Some(p),
            SampleField::Elbow(side, p) => self.arm_mut(side).elbow = Some(p),
            SampleField::HandMovement(side, state) => self.arm_mut(side).movement = Some(state),
        }
    }

    /// All ten fields populated
    pub fn is_complete(&self) -> bool {
        self.mouth_openness.is_some()
            && self.mouth_movement.is_some()
            && self.left.is_complete()
            && self.right.is_complete()
    }

    /// CSV row for a complete sample, `None` otherwise
    pub fn to_csv_row(&self) -> Option<String> {
        let openness = self.mouth_openness?;
        let mouth = self.mouth_movement?;
        let (ls, lw, le, lm) =
            (self.left.shoulder?, self.left.wrist?, self.left.elbow?, self.left.movement?);
        let (rs, rw, re, rm) =
            (self.right.shoulder?, self.right.wrist?, self.right.elbow?, self.right.movement?);

        Some(format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.ts,
            format_decimal(openness),
            mouth.as_flag(),
            format_coordinate(ls),
            format_coordinate(lw),
            format_coordinate(le),
            lm.as_flag(),
            format_coordinate(rs),
            format_coordinate(rw),
            format_coordinate(re),
            rm.as_flag(),
        ))
    }
}
