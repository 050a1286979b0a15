//! Domain models - landmarks, derived signals and recorded samples
//!
//! This module contains the canonical data types used throughout the system:
//! - `Frame` - one camera frame with its capture metadata
//! - `FaceLandmarks` / `PoseLandmarks` - vision library output
//! - `MouthState` / `HandState` / `DisplayState` - derived signals
//! - `Sample` - one recorded row keyed by capture timestamp

pub mod sample;
pub mod types;
